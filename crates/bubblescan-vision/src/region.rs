// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Answer-area geometry shared by row recovery and bubble reading.

/// The margin-cropped answer area of an enhanced sheet, split into equal
/// vertical blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerRegion {
    pub start_x: u32,
    pub start_y: u32,
    pub width: u32,
    pub height: u32,
    pub block_width: u32,
}

impl AnswerRegion {
    /// Crop `margin_ratio` from every edge of a `width` x `height` image and
    /// divide what remains into `num_blocks` columns.
    pub fn new(width: u32, height: u32, margin_ratio: f32, num_blocks: usize) -> Self {
        let start_x = (width as f32 * margin_ratio) as u32;
        let start_y = (height as f32 * margin_ratio) as u32;
        let end_x = (width as f32 * (1.0 - margin_ratio)) as u32;
        let end_y = (height as f32 * (1.0 - margin_ratio)) as u32;
        let region_w = end_x.saturating_sub(start_x);
        let region_h = end_y.saturating_sub(start_y);
        Self {
            start_x,
            start_y,
            width: region_w,
            height: region_h,
            block_width: region_w / num_blocks.max(1) as u32,
        }
    }

    /// Left edge of block `index`.
    pub fn block_x(&self, index: usize) -> u32 {
        self.start_x + index as u32 * self.block_width
    }

    /// Width of one option cell when a block holds `options` choices.
    pub fn option_width(&self, options: usize) -> u32 {
        self.block_width / options.max(1) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_percent_margin_two_blocks() {
        let region = AnswerRegion::new(800, 1200, 0.05, 2);
        assert_eq!(region.start_x, 40);
        assert_eq!(region.start_y, 60);
        assert_eq!(region.width, 720);
        assert_eq!(region.height, 1080);
        assert_eq!(region.block_width, 360);
        assert_eq!(region.block_x(1), 400);
        assert_eq!(region.option_width(4), 90);
    }
}
