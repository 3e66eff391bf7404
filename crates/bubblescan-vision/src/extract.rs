// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-bubble darkness decision.

use bubblescan_core::config::{ExtractConfig, RowConfig};
use bubblescan_core::error::ScanError;
use bubblescan_core::types::{Answer, AnswerVector, Layout};
use image::GrayImage;
use tracing::{debug, instrument};

use crate::region::AnswerRegion;

/// Row recovery came back with fewer centers than the layout has questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowShortfall {
    pub found: usize,
    pub expected: usize,
}

impl From<RowShortfall> for ScanError {
    fn from(shortfall: RowShortfall) -> Self {
        ScanError::InsufficientRows {
            found: shortfall.found,
            expected: shortfall.expected,
        }
    }
}

/// Reads one answer per question from a binary sheet image.
///
/// Intensity of an option cell is `foreground / total * 255`. The option
/// with the lowest intensity wins, and counts as marked only when that
/// intensity is below `intensity_threshold`.
#[derive(Debug, Clone)]
pub struct AnswerExtractor {
    layout: Layout,
    margin_ratio: f32,
    config: ExtractConfig,
}

impl AnswerExtractor {
    pub fn new(layout: Layout, rows: &RowConfig, config: ExtractConfig) -> Self {
        Self {
            layout,
            margin_ratio: rows.margin_ratio,
            config,
        }
    }

    /// Read answers using located row centers.
    ///
    /// Block `i` owns rows `[i * rows_per_block, (i + 1) * rows_per_block)` of
    /// `row_centers`. Output order is block by block, top to bottom.
    #[instrument(skip(self, binary, row_centers), fields(rows = row_centers.len()))]
    pub fn extract(
        &self,
        binary: &GrayImage,
        row_centers: &[u32],
    ) -> Result<AnswerVector, RowShortfall> {
        let expected = self.layout.total_questions();
        if row_centers.len() < expected {
            return Err(RowShortfall {
                found: row_centers.len(),
                expected,
            });
        }

        let region = self.region(binary);
        let option_width = region.option_width(self.layout.options_per_question);
        let radius = self.config.bubble_radius;

        let mut answers = Vec::with_capacity(expected);
        for block in 0..self.layout.num_blocks {
            let block_x = region.block_x(block);
            let first_row = block * self.layout.rows_per_block;

            for &center in &row_centers[first_row..first_row + self.layout.rows_per_block] {
                let top = center.saturating_sub(radius);
                let bottom = (center + radius).min(binary.height());
                let strip_height = bottom.saturating_sub(top);

                let intensities: Vec<Option<f64>> = (0..self.layout.options_per_question)
                    .map(|option| {
                        cell_intensity(
                            binary,
                            block_x + option as u32 * option_width,
                            top,
                            option_width,
                            strip_height,
                        )
                    })
                    .collect();
                answers.push(self.decide(&intensities));
            }
        }

        debug!(answered = answers.iter().filter(|a| a.is_answered()).count(), "Answers read from anchored rows");
        Ok(AnswerVector::new(answers))
    }

    /// Read answers from a uniform grid over the answer area. Used by the
    /// caller when row recovery came back short.
    #[instrument(skip(self, binary))]
    pub fn extract_uniform_grid(&self, binary: &GrayImage) -> AnswerVector {
        let region = self.region(binary);
        let option_width = region.option_width(self.layout.options_per_question);
        let row_height = region.height / self.layout.rows_per_block.max(1) as u32;

        let mut answers = Vec::with_capacity(self.layout.total_questions());
        for block in 0..self.layout.num_blocks {
            let block_x = region.block_x(block);
            for row in 0..self.layout.rows_per_block {
                let row_y = region.start_y + row as u32 * row_height;
                let intensities: Vec<Option<f64>> = (0..self.layout.options_per_question)
                    .map(|option| {
                        cell_intensity(
                            binary,
                            block_x + option as u32 * option_width,
                            row_y,
                            option_width,
                            row_height,
                        )
                    })
                    .collect();
                answers.push(self.decide(&intensities));
            }
        }

        debug!(answered = answers.iter().filter(|a| a.is_answered()).count(), "Answers read from uniform grid");
        AnswerVector::new(answers)
    }

    /// Darkest option below the threshold, else unanswered. Any empty cell
    /// (strip clipped away by the image border) makes the row unanswered.
    fn decide(&self, intensities: &[Option<f64>]) -> Answer {
        let mut darkest: Option<(usize, f64)> = None;
        for (option, intensity) in intensities.iter().enumerate() {
            let Some(value) = *intensity else {
                return Answer::Unanswered;
            };
            if darkest.is_none_or(|(_, best)| value < best) {
                darkest = Some((option, value));
            }
        }
        match darkest {
            Some((option, value)) if value < self.config.intensity_threshold => {
                Answer::Answered(option)
            }
            _ => Answer::Unanswered,
        }
    }

    fn region(&self, binary: &GrayImage) -> AnswerRegion {
        AnswerRegion::new(
            binary.width(),
            binary.height(),
            self.margin_ratio,
            self.layout.num_blocks,
        )
    }
}

/// `foreground / total * 255` over a rectangle clipped to the image, or
/// `None` when nothing of the rectangle lies inside the image.
pub fn cell_intensity(binary: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> Option<f64> {
    let x_end = x.saturating_add(width).min(binary.width());
    let y_end = y.saturating_add(height).min(binary.height());
    if x >= x_end || y >= y_end {
        return None;
    }
    let total = ((x_end - x) * (y_end - y)) as f64;
    let foreground = (y..y_end)
        .flat_map(|row| (x..x_end).map(move |col| (col, row)))
        .filter(|&(col, row)| binary.get_pixel(col, row).0[0] > 0)
        .count() as f64;
    Some(foreground / total * 255.0)
}
