// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration. Every value is caller-supplied; the core never reads
// the environment or the filesystem.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::types::Layout;

/// Full configuration surface for the recognition pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub layout: Layout,
    pub enhance: EnhanceConfig,
    pub rows: RowConfig,
    pub extract: ExtractConfig,
    pub detect: DetectConfig,
    pub rectify: RectifyConfig,
    pub stability: StabilityConfig,
}

impl ScanConfig {
    /// Default configuration with a custom layout.
    pub fn with_layout(layout: Layout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    /// Check layout invariants and numeric ranges.
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;

        if !(self.enhance.upscale_factor >= 1.0 && self.enhance.upscale_factor.is_finite()) {
            return Err(ScanError::Config(format!(
                "upscale_factor must be >= 1.0, got {}",
                self.enhance.upscale_factor
            )));
        }
        if self.enhance.threshold_block_size < 3 || self.enhance.threshold_block_size % 2 == 0 {
            return Err(ScanError::Config(format!(
                "threshold_block_size must be odd and >= 3, got {}",
                self.enhance.threshold_block_size
            )));
        }
        if self.enhance.clahe_tile_grid == 0 {
            return Err(ScanError::Config("clahe_tile_grid must be at least 1".into()));
        }
        if !(0.0..0.5).contains(&self.rows.margin_ratio) {
            return Err(ScanError::Config(format!(
                "margin_ratio must be in [0, 0.5), got {}",
                self.rows.margin_ratio
            )));
        }
        if !(self.rows.timing_strip_ratio > 0.0 && self.rows.timing_strip_ratio <= 1.0) {
            return Err(ScanError::Config(format!(
                "timing_strip_ratio must be in (0, 1], got {}",
                self.rows.timing_strip_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.rows.min_detection_ratio) {
            return Err(ScanError::Config(format!(
                "min_detection_ratio must be in [0, 1], got {}",
                self.rows.min_detection_ratio
            )));
        }
        if self.detect.blur_kernel % 2 == 0 || self.detect.dilate_kernel % 2 == 0 {
            return Err(ScanError::Config(
                "blur_kernel and dilate_kernel must be odd".into(),
            ));
        }
        if self.rectify.width == 0 || self.rectify.height == 0 {
            return Err(ScanError::Config("rectified size must be non-zero".into()));
        }
        if self.stability.frame_count == 0 {
            return Err(ScanError::Config("stability frame_count must be at least 1".into()));
        }
        Ok(())
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Image enhancement (grayscale, upscale, CLAHE, adaptive threshold).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Uniform upscale applied before thresholding.
    pub upscale_factor: f32,
    /// CLAHE histogram clip limit (multiple of the mean bin height).
    pub clahe_clip_limit: f32,
    /// CLAHE tiles per axis.
    pub clahe_tile_grid: u32,
    /// Adaptive threshold neighbourhood (odd, in pixels).
    pub threshold_block_size: u32,
    /// Subtracted from the local mean before comparison.
    pub threshold_bias: i32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            upscale_factor: 2.0,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 8,
            threshold_block_size: 11,
            threshold_bias: 2,
        }
    }
}

/// Timing-mark row recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowConfig {
    /// Fraction cropped from every edge before analysis.
    pub margin_ratio: f32,
    /// Width of the timing-mark strip as a fraction of the block width.
    pub timing_strip_ratio: f32,
    /// Minimum pixel distance between two accepted peaks.
    pub min_peak_distance: usize,
    /// Peak threshold = mean * (1 + ratio).
    pub peak_threshold_ratio: f32,
    /// Fraction of `rows_per_block` peaks required before the detected peaks
    /// are trusted over a uniform grid.
    pub min_detection_ratio: f32,
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            margin_ratio: 0.05,
            timing_strip_ratio: 0.10,
            min_peak_distance: 20,
            peak_threshold_ratio: 0.3,
            min_detection_ratio: 0.8,
        }
    }
}

/// Per-bubble darkness decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Half the height of the strip sampled around each row center.
    pub bubble_radius: u32,
    /// Cells with intensity below this (0-255) count as marked.
    pub intensity_threshold: f64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            bubble_radius: 15,
            intensity_threshold: 100.0,
        }
    }
}

/// Paper corner detection in unrectified frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Frames wider than this are downscaled before detection.
    pub max_working_width: u32,
    /// Gaussian kernel size (odd).
    pub blur_kernel: u32,
    /// Minimum contour area as a fraction of the frame area.
    pub min_area_ratio: f64,
    /// Douglas-Peucker epsilon as a fraction of the contour perimeter.
    pub approx_epsilon_ratio: f64,
    /// Square dilation kernel size (odd).
    pub dilate_kernel: u32,
    /// Adaptive threshold neighbourhood (odd).
    pub threshold_block_size: u32,
    pub threshold_bias: i32,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            max_working_width: 800,
            blur_kernel: 11,
            min_area_ratio: 0.2,
            approx_epsilon_ratio: 0.02,
            dilate_kernel: 5,
            threshold_block_size: 11,
            threshold_bias: 2,
        }
    }
}

/// Canonical output size of the perspective warp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for RectifyConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 1000,
        }
    }
}

/// Temporal stability gate for live capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Maximum per-corner movement (pixels) still counted as stable.
    pub threshold_px: f32,
    /// Consecutive stable frames required before reporting stable.
    pub frame_count: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            threshold_px: 15.0,
            frame_count: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ScanConfig::default();
        assert_eq!(config.layout, Layout::new(2, 20, 4));
        assert_eq!(config.enhance.upscale_factor, 2.0);
        assert_eq!(config.rows.min_peak_distance, 20);
        assert_eq!(config.rows.peak_threshold_ratio, 0.3);
        assert_eq!(config.extract.bubble_radius, 15);
        assert_eq!(config.extract.intensity_threshold, 100.0);
        assert_eq!(config.stability.threshold_px, 15.0);
        assert_eq!(config.stability.frame_count, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = ScanConfig::from_json(
            r#"{ "layout": { "num_blocks": 1, "rows_per_block": 5, "options_per_question": 5 },
                 "extract": { "intensity_threshold": 80.0 } }"#,
        )
        .expect("parse");
        assert_eq!(config.layout.total_questions(), 5);
        assert_eq!(config.extract.intensity_threshold, 80.0);
        assert_eq!(config.extract.bubble_radius, 15);
        assert_eq!(config.rectify.width, 800);
    }

    #[test]
    fn even_block_size_is_rejected() {
        let mut config = ScanConfig::default();
        config.enhance.threshold_block_size = 10;
        assert!(matches!(config.validate(), Err(ScanError::Config(_))));
    }

    #[test]
    fn bad_layout_is_rejected_as_layout_error() {
        let config = ScanConfig::with_layout(Layout::new(2, 0, 4));
        assert!(matches!(config.validate(), Err(ScanError::InvalidLayout(_))));
    }
}
