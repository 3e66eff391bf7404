// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Paper quadrilateral detection in unrectified camera frames.

use bubblescan_core::config::DetectConfig;
use bubblescan_core::types::{Corners, Point};
use image::{DynamicImage, GrayImage, imageops};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use tracing::{debug, instrument, trace};

use crate::enhance::adaptive_threshold;
use crate::geometry::{
    approximate_closed_contour, contour_perimeter, is_convex, order_corners, shoelace_area,
};

/// Finds the exam sheet's outline in a free-hand or live frame.
///
/// Pure function of the frame: no state is carried between calls.
#[derive(Debug, Clone, Default)]
pub struct PaperCornerDetector {
    config: DetectConfig,
}

impl PaperCornerDetector {
    pub fn new(config: DetectConfig) -> Self {
        Self { config }
    }

    /// Detect the sheet corners, or `None` when no quadrilateral covering
    /// at least `min_area_ratio` of the frame is found.
    ///
    /// 1. Grayscale, downscaled (area averaging) if wider than `max_working_width`
    /// 2. Gaussian blur to wash out printed text
    /// 3. Adaptive threshold with dark pixels as foreground
    /// 4. Square dilation to close gaps in the outline
    /// 5. Outermost contours, simplified with Douglas-Peucker
    /// 6. Largest convex four-vertex candidate, rescaled and ordered
    #[instrument(skip(self, frame), fields(width = frame.width(), height = frame.height()))]
    pub fn detect(&self, frame: &DynamicImage) -> Option<Corners> {
        let (orig_w, orig_h) = (frame.width(), frame.height());
        if orig_w == 0 || orig_h == 0 {
            return None;
        }

        let gray = self.working_image(frame);
        let (work_w, work_h) = gray.dimensions();
        let mask = self.edge_mask(&gray);

        let frame_area = work_w as f64 * work_h as f64;
        let min_area = frame_area * self.config.min_area_ratio;

        let mut best: Option<(f64, [Point; 4])> = None;
        for contour in find_contours::<i32>(&mask) {
            if contour.border_type != BorderType::Outer || contour.parent.is_some() {
                continue;
            }
            if contour.points.len() < 4 {
                continue;
            }

            let epsilon = contour_perimeter(&contour.points) * self.config.approx_epsilon_ratio;
            let polygon = approximate_closed_contour(&contour.points, epsilon);
            let area = shoelace_area(&polygon) as f64;
            trace!(vertices = polygon.len(), area, "Contour candidate");

            if area < min_area || polygon.len() != 4 || !is_convex(&polygon) {
                continue;
            }
            if best.as_ref().is_none_or(|(best_area, _)| area > *best_area) {
                best = Some((area, [polygon[0], polygon[1], polygon[2], polygon[3]]));
            }
        }

        let Some((area, quad)) = best else {
            debug!("No paper outline found");
            return None;
        };

        let sx = orig_w as f32 / work_w as f32;
        let sy = orig_h as f32 / work_h as f32;
        let corners = order_corners(quad.map(|p| p.scaled(sx, sy)));
        debug!(
            area,
            top_left = ?corners.top_left(),
            bottom_right = ?corners.bottom_right(),
            "Paper outline detected"
        );
        Some(corners)
    }

    fn working_image(&self, frame: &DynamicImage) -> GrayImage {
        let gray = frame.to_luma8();
        let max_w = self.config.max_working_width;
        if max_w == 0 || gray.width() <= max_w {
            return gray;
        }
        let scale = max_w as f32 / gray.width() as f32;
        let new_h = ((gray.height() as f32 * scale).round() as u32).max(1);
        imageops::thumbnail(&gray, max_w, new_h)
    }

    /// Binary image where the sheet boundary (and other dark edges) is 255.
    fn edge_mask(&self, gray: &GrayImage) -> GrayImage {
        let blurred = gaussian_blur_f32(gray, kernel_sigma(self.config.blur_kernel));
        let edges = adaptive_threshold(
            &blurred,
            self.config.threshold_block_size,
            self.config.threshold_bias,
        );
        let radius = (self.config.dilate_kernel / 2).min(u8::MAX as u32) as u8;
        if radius == 0 {
            edges
        } else {
            dilate(&edges, Norm::LInf, radius)
        }
    }
}

/// Sigma a square Gaussian kernel of width `ksize` implies.
pub fn kernel_sigma(ksize: u32) -> f32 {
    let k = ksize.max(1) as f32;
    (0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8).max(0.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn sheet_on_desk(w: u32, h: u32, rect: (u32, u32, u32, u32)) -> DynamicImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([30]));
        for y in rect.1..rect.3 {
            for x in rect.0..rect.2 {
                img.put_pixel(x, y, Luma([235]));
            }
        }
        DynamicImage::ImageLuma8(img)
    }

    fn near(p: Point, x: f32, y: f32, tol: f32) -> bool {
        (p.x - x).abs() <= tol && (p.y - y).abs() <= tol
    }

    #[test]
    fn blank_frame_has_no_corners() {
        let frame = DynamicImage::ImageLuma8(GrayImage::from_pixel(320, 240, Luma([128])));
        assert_eq!(PaperCornerDetector::default().detect(&frame), None);
    }

    #[test]
    fn bright_sheet_is_found() {
        let frame = sheet_on_desk(400, 500, (50, 60, 350, 440));
        let corners = PaperCornerDetector::default()
            .detect(&frame)
            .expect("sheet outline");
        assert!(near(corners.top_left(), 50.0, 60.0, 20.0), "{corners:?}");
        assert!(near(corners.top_right(), 350.0, 60.0, 20.0), "{corners:?}");
        assert!(near(corners.bottom_right(), 350.0, 440.0, 20.0), "{corners:?}");
        assert!(near(corners.bottom_left(), 50.0, 440.0, 20.0), "{corners:?}");
    }

    #[test]
    fn small_sheet_is_rejected() {
        // Roughly 6% of the frame.
        let frame = sheet_on_desk(400, 500, (150, 200, 250, 320));
        assert_eq!(PaperCornerDetector::default().detect(&frame), None);
    }

    #[test]
    fn wide_frames_are_rescaled_to_original_coordinates() {
        let frame = sheet_on_desk(1600, 1000, (200, 100, 1400, 900));
        let corners = PaperCornerDetector::default()
            .detect(&frame)
            .expect("sheet outline");
        assert!(near(corners.top_left(), 200.0, 100.0, 40.0), "{corners:?}");
        assert!(near(corners.bottom_right(), 1400.0, 900.0, 40.0), "{corners:?}");
    }

    #[test]
    fn default_kernel_sigma() {
        assert!((kernel_sigma(11) - 2.0).abs() < 1e-6);
    }
}
