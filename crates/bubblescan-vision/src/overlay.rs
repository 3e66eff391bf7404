// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Diagnostic rasters for display. Nothing here feeds back into detection.

use bubblescan_core::types::{AnswerVector, Layout};
use image::{DynamicImage, GrayImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use tracing::{debug, instrument};

use crate::region::AnswerRegion;

pub const ROW_MARKER_COLOUR: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const ANSWER_MARK_COLOUR: Rgba<u8> = Rgba([0, 200, 0, 255]);

/// Copy of `original` with a red line across the full width at every row
/// center. Centers are in enhanced (upscaled) coordinates and are divided by
/// `upscale_factor` to land on the original.
#[instrument(skip(original, row_centers), fields(rows = row_centers.len()))]
pub fn draw_row_markers(original: &DynamicImage, row_centers: &[u32], upscale_factor: f32) -> RgbaImage {
    let mut canvas = original.to_rgba8();
    let factor = if upscale_factor > 0.0 { upscale_factor } else { 1.0 };
    let right = canvas.width().saturating_sub(1) as f32;

    for &center in row_centers {
        let y = center as f32 / factor;
        if y >= canvas.height() as f32 {
            continue;
        }
        draw_line_segment_mut(&mut canvas, (0.0, y), (right, y), ROW_MARKER_COLOUR);
    }

    debug!("Row markers drawn");
    canvas
}

/// Enhanced binary image with a green circle on every selected option cell.
///
/// Rows are assigned to blocks the same way the extractor assigns them, so
/// the circles show exactly which cells were read.
#[instrument(skip_all, fields(answers = answers.len()))]
pub fn draw_answer_marks(
    enhanced: &GrayImage,
    layout: &Layout,
    margin_ratio: f32,
    row_centers: &[u32],
    answers: &AnswerVector,
) -> RgbaImage {
    let mut canvas = DynamicImage::ImageLuma8(enhanced.clone()).to_rgba8();
    let region = AnswerRegion::new(enhanced.width(), enhanced.height(), margin_ratio, layout.num_blocks);
    let option_width = region.option_width(layout.options_per_question);
    let radius = (option_width / 3).max(2) as i32;

    for (question, answer) in answers.iter().enumerate() {
        let Some(option) = answer.index() else {
            continue;
        };
        let Some(&center_y) = row_centers.get(question) else {
            break;
        };
        let block = question / layout.rows_per_block.max(1);
        let cx = region.block_x(block) + option as u32 * option_width + option_width / 2;
        draw_hollow_circle_mut(&mut canvas, (cx as i32, center_y as i32), radius, ANSWER_MARK_COLOUR);
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use bubblescan_core::types::Answer;
    use image::Luma;

    #[test]
    fn row_markers_are_scaled_back() {
        let original = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 100, Luma([255])));
        let marked = draw_row_markers(&original, &[40, 120], 2.0);
        assert_eq!(*marked.get_pixel(50, 20), ROW_MARKER_COLOUR);
        assert_eq!(*marked.get_pixel(50, 60), ROW_MARKER_COLOUR);
        assert_eq!(*marked.get_pixel(50, 40), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn markers_past_the_bottom_are_skipped() {
        let original = DynamicImage::ImageLuma8(GrayImage::new(20, 20));
        let marked = draw_row_markers(&original, &[500], 2.0);
        assert!(marked.pixels().all(|p| *p != ROW_MARKER_COLOUR));
    }

    #[test]
    fn circles_only_for_answered_questions() {
        let enhanced = GrayImage::new(400, 400);
        let layout = Layout::new(1, 2, 4);
        let answers = AnswerVector::new(vec![Answer::Answered(1), Answer::Unanswered]);
        let marked = draw_answer_marks(&enhanced, &layout, 0.05, &[100, 300], &answers);

        // Block width 360 from x=20, option width 90: option B centered at 155.
        let radius = 30;
        assert_eq!(*marked.get_pixel(155 + radius, 100), ANSWER_MARK_COLOUR);
        assert!((0..400).all(|x| *marked.get_pixel(x, 300) != ANSWER_MARK_COLOUR));
    }
}
