// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Row recovery from timing marks.
//
// Each block carries a column of printed timing marks along its left edge.
// Projecting the foreground of that strip onto the vertical axis gives one
// bump per answer row; the bumps' positions are the row centers. When a block
// yields too few bumps its rows fall back to an evenly spaced grid, without
// affecting the other blocks.

use bubblescan_core::config::RowConfig;
use bubblescan_core::types::Layout;
use image::GrayImage;
use tracing::{debug, instrument, warn};

use crate::region::AnswerRegion;

/// How a block's row centers were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSource {
    /// Timing-mark peaks.
    Peaks,
    /// Evenly spaced grid after peak detection undershot.
    UniformFallback,
}

/// Row centers found in one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRows {
    /// Ascending y coordinates in image space.
    pub centers: Vec<u32>,
    pub source: RowSource,
    /// Raw peak count before thinning.
    pub peak_count: usize,
}

/// Row centers for the whole sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDetection {
    /// All blocks' centers, sorted ascending.
    pub centers: Vec<u32>,
    pub blocks: Vec<BlockRows>,
}

impl RowDetection {
    /// Whether enough rows were recovered to read every question.
    pub fn is_complete(&self, layout: &Layout) -> bool {
        self.centers.len() >= layout.total_questions()
    }

    /// Centers concatenated block by block, so that block `i` owns entries
    /// `[i * rows_per_block, (i + 1) * rows_per_block)`. Side-by-side blocks
    /// share y coordinates, which the sorted list would interleave.
    pub fn block_ordered(&self) -> Vec<u32> {
        self.blocks
            .iter()
            .flat_map(|b| b.centers.iter().copied())
            .collect()
    }

    /// Number of blocks that had to use the uniform grid.
    pub fn fallback_blocks(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.source == RowSource::UniformFallback)
            .count()
    }
}

/// Recovers the vertical center of every answer row.
#[derive(Debug, Clone)]
pub struct RowLocator {
    layout: Layout,
    config: RowConfig,
}

impl RowLocator {
    pub fn new(layout: Layout, config: RowConfig) -> Self {
        Self { layout, config }
    }

    /// Locate row centers in a binary (ink = 255) sheet image.
    #[instrument(skip(self, binary), fields(width = binary.width(), height = binary.height()))]
    pub fn locate(&self, binary: &GrayImage) -> RowDetection {
        let region = AnswerRegion::new(
            binary.width(),
            binary.height(),
            self.config.margin_ratio,
            self.layout.num_blocks,
        );
        let strip_width =
            ((region.block_width as f32 * self.config.timing_strip_ratio) as u32).max(1);

        let projections: Vec<Vec<f64>> = (0..self.layout.num_blocks)
            .map(|block| {
                timing_projection(
                    binary,
                    region.block_x(block),
                    region.start_y,
                    strip_width,
                    region.height,
                )
            })
            .collect();

        self.locate_in_projections(&projections, region.start_y, region.height)
    }

    /// Turn one vertical projection per block into row centers.
    ///
    /// `offset_y` is the image row of `projection[0]`; `region_height` is the
    /// span the uniform fallback divides.
    pub fn locate_in_projections(
        &self,
        projections: &[Vec<f64>],
        offset_y: u32,
        region_height: u32,
    ) -> RowDetection {
        let blocks: Vec<BlockRows> = projections
            .iter()
            .enumerate()
            .map(|(index, projection)| {
                let rows = self.block_rows(projection, offset_y, region_height);
                debug!(
                    block = index,
                    peaks = rows.peak_count,
                    rows = rows.centers.len(),
                    source = ?rows.source,
                    "Block rows located"
                );
                rows
            })
            .collect();

        let mut centers: Vec<u32> = blocks.iter().flat_map(|b| b.centers.iter().copied()).collect();
        centers.sort_unstable();

        RowDetection { centers, blocks }
    }

    /// Row centers for a single block.
    pub fn block_rows(&self, projection: &[f64], offset_y: u32, region_height: u32) -> BlockRows {
        let expected = self.layout.rows_per_block;
        let peaks = find_peaks(
            projection,
            self.config.min_peak_distance,
            self.config.peak_threshold_ratio,
        );
        let peak_count = peaks.len();

        if peak_count as f32 >= expected as f32 * self.config.min_detection_ratio && peak_count > 0 {
            let selected = thin_evenly(peaks, expected);
            BlockRows {
                centers: selected.into_iter().map(|p| offset_y + p as u32).collect(),
                source: RowSource::Peaks,
                peak_count,
            }
        } else {
            warn!(
                peak_count,
                expected, "Too few timing-mark peaks; using uniform row grid"
            );
            BlockRows {
                centers: uniform_centers(offset_y, region_height, expected),
                source: RowSource::UniformFallback,
                peak_count,
            }
        }
    }
}

/// Foreground pixel count per image row inside the given strip.
pub fn timing_projection(binary: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> Vec<f64> {
    let x_end = (x + width).min(binary.width());
    let y_end = (y + height).min(binary.height());
    (y..y_end)
        .map(|row| {
            (x..x_end)
                .filter(|&col| binary.get_pixel(col, row).0[0] > 0)
                .count() as f64
        })
        .collect()
}

/// Indices of local maxima above `mean * (1 + threshold_ratio)`, at least
/// `min_distance` apart, ascending.
///
/// Flat-topped maxima report the middle of the plateau. When two maxima are
/// closer than `min_distance` the higher one wins (the earlier on ties).
pub fn find_peaks(projection: &[f64], min_distance: usize, threshold_ratio: f32) -> Vec<usize> {
    if projection.is_empty() {
        return Vec::new();
    }
    let mean = projection.iter().sum::<f64>() / projection.len() as f64;
    let threshold = mean * (1.0 + threshold_ratio as f64);
    let half = (min_distance / 2).max(1);

    let mut candidates: Vec<usize> = Vec::new();
    let mut y = 0;
    while y < projection.len() {
        let value = projection[y];
        if value <= threshold {
            y += 1;
            continue;
        }
        // Extent of the plateau sharing this value.
        let mut end = y;
        while end + 1 < projection.len() && projection[end + 1] == value {
            end += 1;
        }
        let lo = y.saturating_sub(half);
        let hi = (end + half).min(projection.len() - 1);
        let is_local_max = projection[lo..=hi].iter().all(|&v| v <= value);
        if is_local_max {
            candidates.push((y + end) / 2);
        }
        y = end + 1;
    }

    // Strongest first; stable sort keeps earlier positions ahead on ties.
    candidates.sort_by(|&a, &b| {
        projection[b]
            .partial_cmp(&projection[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut accepted: Vec<usize> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if accepted.iter().all(|&p| p.abs_diff(candidate) >= min_distance) {
            accepted.push(candidate);
        }
    }
    accepted.sort_unstable();
    accepted
}

/// Keep at most `expected` peaks, taking every `len / expected`-th one when
/// there are too many.
pub fn thin_evenly(mut peaks: Vec<usize>, expected: usize) -> Vec<usize> {
    peaks.sort_unstable();
    if expected == 0 || peaks.len() <= expected {
        return peaks;
    }
    let stride = peaks.len() / expected;
    peaks
        .into_iter()
        .enumerate()
        .filter(|(index, _)| index % stride == 0)
        .map(|(_, peak)| peak)
        .take(expected)
        .collect()
}

/// `rows` evenly spaced centers across `height` pixels starting at `start`.
pub fn uniform_centers(start: u32, height: u32, rows: usize) -> Vec<u32> {
    if rows == 0 {
        return Vec::new();
    }
    let row_height = height / rows as u32;
    (0..rows as u32)
        .map(|row| start + row * row_height + row_height / 2)
        .collect()
}
