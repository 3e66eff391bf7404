// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectification of a detected sheet onto a fixed-size canvas.

use bubblescan_core::config::RectifyConfig;
use bubblescan_core::types::Corners;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use tracing::{debug, instrument, warn};

use crate::geometry::shoelace_area;

/// Warps the quadrilateral bounded by [`Corners`] onto a `width` x `height`
/// rectangle. Output size never depends on the input skew.
#[derive(Debug, Clone, Default)]
pub struct PerspectiveRectifier {
    config: RectifyConfig,
}

impl PerspectiveRectifier {
    pub fn new(config: RectifyConfig) -> Self {
        Self { config }
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Resample `frame` so the given corners land on the canvas corners.
    ///
    /// Returns `None` when the corners are degenerate (collinear or
    /// coincident) and no projective transform exists.
    #[instrument(skip(self, frame, corners))]
    pub fn rectify(&self, frame: &DynamicImage, corners: &Corners) -> Option<DynamicImage> {
        let (out_w, out_h) = self.output_size();
        let dest: [(f32, f32); 4] = [
            (0.0, 0.0),
            (out_w as f32, 0.0),
            (out_w as f32, out_h as f32),
            (0.0, out_h as f32),
        ];

        if shoelace_area(corners.points()) < 1.0 {
            warn!(?corners, "Corners enclose no area");
            return None;
        }
        let Some(projection) = Projection::from_control_points(corners.as_tuples(), dest) else {
            warn!(?corners, "Degenerate corners, no projective transform");
            return None;
        };

        let rgba = frame.to_rgba8();
        let mut output = RgbaImage::new(out_w, out_h);
        warp_into(
            &rgba,
            &projection,
            Interpolation::Bilinear,
            Rgba([255, 255, 255, 255]),
            &mut output,
        );

        debug!(out_w, out_h, "Sheet rectified");
        Some(DynamicImage::ImageRgba8(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bubblescan_core::types::Point;
    use image::{GrayImage, Luma};

    #[test]
    fn output_is_always_canonical_size() {
        let frame = DynamicImage::ImageLuma8(GrayImage::from_pixel(640, 480, Luma([200])));
        let skewed = Corners([
            Point::new(100.0, 40.0),
            Point::new(520.0, 80.0),
            Point::new(560.0, 450.0),
            Point::new(60.0, 420.0),
        ]);
        let out = PerspectiveRectifier::default()
            .rectify(&frame, &skewed)
            .expect("valid quad");
        assert_eq!((out.width(), out.height()), (800, 1000));
    }

    #[test]
    fn quadrant_content_lands_in_matching_quadrant() {
        // Dark top-left quarter of the sheet region should stay top-left.
        let mut img = GrayImage::from_pixel(400, 400, Luma([255]));
        for y in 0..200 {
            for x in 0..200 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let frame = DynamicImage::ImageLuma8(img);
        let full = Corners([
            Point::new(0.0, 0.0),
            Point::new(400.0, 0.0),
            Point::new(400.0, 400.0),
            Point::new(0.0, 400.0),
        ]);
        let rectifier = PerspectiveRectifier::new(RectifyConfig {
            width: 200,
            height: 200,
        });
        let out = rectifier.rectify(&frame, &full).expect("valid quad").to_luma8();
        assert!(out.get_pixel(40, 40).0[0] < 50);
        assert!(out.get_pixel(160, 160).0[0] > 200);
    }

    #[test]
    fn collapsed_corners_are_rejected() {
        let frame = DynamicImage::ImageLuma8(GrayImage::new(100, 100));
        let p = Point::new(10.0, 10.0);
        assert!(PerspectiveRectifier::default().rectify(&frame, &Corners([p; 4])).is_none());
    }
}
