// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch sheet reading: raw image in, answer vector out.

use bubblescan_core::config::ScanConfig;
use bubblescan_core::error::Result;
use bubblescan_core::types::{AnswerVector, Corners};
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::enhance::ImageEnhancer;
use crate::extract::{AnswerExtractor, RowShortfall};
use crate::raster::RawImage;
use crate::rectify::PerspectiveRectifier;
use crate::rows::{RowDetection, RowLocator};

/// Everything one pass over a sheet produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetReading {
    pub answers: AnswerVector,
    /// Row centers in enhanced-image coordinates, block by block.
    pub row_centers: Vec<u32>,
    /// True when rows could not be recovered and the uniform grid was read.
    pub used_grid_fallback: bool,
    /// Number of blocks whose rows came from the uniform fallback.
    pub fallback_blocks: usize,
    /// Dimensions of the enhanced image the centers refer to.
    pub enhanced_width: u32,
    pub enhanced_height: u32,
}

/// The enhance -> locate rows -> extract pipeline with a fixed configuration.
#[derive(Debug, Clone)]
pub struct SheetReader {
    config: ScanConfig,
    rows: RowLocator,
    extractor: AnswerExtractor,
    rectifier: PerspectiveRectifier,
}

impl SheetReader {
    /// Build a reader, rejecting an invalid configuration up front.
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rows: RowLocator::new(config.layout, config.rows.clone()),
            extractor: AnswerExtractor::new(config.layout, &config.rows, config.extract.clone()),
            rectifier: PerspectiveRectifier::new(config.rectify.clone()),
            config,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Read a raw buffer handed over by the capture side.
    pub fn read(&self, raw: RawImage) -> Result<SheetReading> {
        let image = raw.into_dynamic()?;
        Ok(self.read_dynamic(&image))
    }

    /// Read an already-decoded, already-cropped sheet photo.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn read_dynamic(&self, image: &DynamicImage) -> SheetReading {
        let enhanced = self.enhance(image);
        self.read_enhanced(&enhanced)
    }

    /// Rectify a live frame with the given corners, then read it.
    ///
    /// `None` when the corners admit no perspective transform.
    #[instrument(skip(self, frame, corners))]
    pub fn read_frame(&self, frame: &DynamicImage, corners: &Corners) -> Option<SheetReading> {
        let rectified = self.rectifier.rectify(frame, corners)?;
        Some(self.read_dynamic(&rectified))
    }

    /// Binary image with ink as foreground.
    pub fn enhance(&self, image: &DynamicImage) -> GrayImage {
        ImageEnhancer::from_dynamic(image, self.config.enhance.clone()).enhance()
    }

    /// Locate rows and read answers from an enhanced binary image.
    ///
    /// Too few rows switches to the uniform grid for the whole sheet. A block
    /// with almost all of its timing marks keeps its peaks, so a sheet can
    /// still come up a row or two short here.
    pub fn read_enhanced(&self, enhanced: &GrayImage) -> SheetReading {
        let detection: RowDetection = self.rows.locate(enhanced);
        let row_centers = detection.block_ordered();

        let (answers, used_grid_fallback) = match self.extractor.extract(enhanced, &row_centers) {
            Ok(answers) => (answers, false),
            Err(RowShortfall { found, expected }) => {
                warn!(found, expected, "Row recovery came back short; reading uniform grid");
                (self.extractor.extract_uniform_grid(enhanced), true)
            }
        };

        info!(
            questions = answers.len(),
            answered = answers.answered_count(),
            fallback_blocks = detection.fallback_blocks(),
            used_grid_fallback,
            "Sheet read"
        );

        SheetReading {
            answers,
            row_centers,
            used_grid_fallback,
            fallback_blocks: detection.fallback_blocks(),
            enhanced_width: enhanced.width(),
            enhanced_height: enhanced.height(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bubblescan_core::error::ScanError;
    use bubblescan_core::types::{Answer, Layout};
    use image::Luma;

    /// Binary 400x1000 sheet for one block of ten rows.
    ///
    /// Answer area is x 20..380, y 50..950, so grid rows are 90 px tall and
    /// option cells 90 px wide. The timing strip is x 20..56 and carries a
    /// 6 px mark at the middle of each of the first `marks` rows. Every
    /// option except the chosen one is inked, leaving the strip clear.
    fn timing_sheet(marks: usize, answers: &[Option<usize>]) -> GrayImage {
        let mut sheet = GrayImage::new(400, 1000);
        for (row, answer) in answers.iter().enumerate() {
            let top = 50 + row as u32 * 90;
            if row < marks {
                let center = top + 45;
                for y in center - 3..center + 3 {
                    for x in 20..56 {
                        sheet.put_pixel(x, y, Luma([255]));
                    }
                }
            }
            for option in 0..4u32 {
                if *answer == Some(option as usize) {
                    continue;
                }
                let x0 = (20 + option * 90).max(56);
                for y in top..top + 90 {
                    for x in x0..20 + (option + 1) * 90 {
                        sheet.put_pixel(x, y, Luma([255]));
                    }
                }
            }
        }
        sheet
    }

    fn ten_row_answers() -> Vec<Option<usize>> {
        (0..10).map(|row| if row == 5 { None } else { Some(row % 4) }).collect()
    }

    fn expected(answers: &[Option<usize>]) -> Vec<Answer> {
        answers
            .iter()
            .map(|a| a.map_or(Answer::Unanswered, Answer::Answered))
            .collect()
    }

    fn ten_row_reader() -> SheetReader {
        SheetReader::new(ScanConfig::with_layout(Layout::new(1, 10, 4))).expect("valid config")
    }

    #[test]
    fn all_timing_marks_read_from_anchored_rows() {
        let answers = ten_row_answers();
        let reading = ten_row_reader().read_enhanced(&timing_sheet(10, &answers));

        assert!(!reading.used_grid_fallback);
        assert_eq!(reading.fallback_blocks, 0);
        assert_eq!(reading.row_centers.len(), 10);
        assert_eq!(reading.answers.as_slice(), expected(&answers).as_slice());
    }

    #[test]
    fn one_missing_timing_mark_reads_the_uniform_grid() {
        // Nine of ten marks clears the 80% bar, so the block keeps its nine
        // peaks and the sheet comes up one row short.
        let answers = ten_row_answers();
        let reading = ten_row_reader().read_enhanced(&timing_sheet(9, &answers));

        assert!(reading.used_grid_fallback);
        assert_eq!(reading.fallback_blocks, 0);
        assert_eq!(reading.row_centers.len(), 9);
        assert_eq!(reading.answers.as_slice(), expected(&answers).as_slice());
    }

    #[test]
    fn invalid_layout_is_rejected_at_construction() {
        let config = ScanConfig::with_layout(Layout::new(0, 20, 4));
        assert!(matches!(SheetReader::new(config), Err(ScanError::InvalidLayout(_))));
    }

    #[test]
    fn blank_page_reads_every_question_via_uniform_rows() {
        let reader = SheetReader::new(ScanConfig::default()).expect("valid config");
        let page = DynamicImage::ImageLuma8(GrayImage::from_pixel(300, 400, Luma([250])));
        let reading = reader.read_dynamic(&page);

        assert_eq!(reading.answers.len(), 40);
        assert_eq!(reading.row_centers.len(), 40);
        assert_eq!(reading.fallback_blocks, 2);
        assert!(!reading.used_grid_fallback);
        assert_eq!((reading.enhanced_width, reading.enhanced_height), (600, 800));
    }

    #[test]
    fn raw_buffers_are_validated_before_reading() {
        let reader = SheetReader::new(ScanConfig::default()).expect("valid config");
        let raw = RawImage::from_dynamic(&DynamicImage::ImageLuma8(GrayImage::new(10, 10)));
        assert!(reader.read(raw).is_ok());
        assert!(RawImage::new(10, 10, 1, vec![0; 99]).is_err());
    }

    #[test]
    fn degenerate_corners_yield_no_reading() {
        let reader = SheetReader::new(ScanConfig::default()).expect("valid config");
        let frame = DynamicImage::ImageLuma8(GrayImage::new(64, 64));
        let p = bubblescan_core::types::Point::new(5.0, 5.0);
        assert!(reader.read_frame(&frame, &Corners([p; 4])).is_none());
    }
}
