// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sheet enhancement pipeline: grayscale conversion, smooth upscaling, local
// contrast equalization (CLAHE) and adaptive binarization.

use bubblescan_core::config::EnhanceConfig;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use tracing::{debug, info, instrument};

/// Turns a raw photo into a binary image where ink is foreground (255).
///
/// Each step consumes `self` and returns the transformed enhancer, so the
/// intermediate rasters are dropped as soon as the next one exists:
///
/// ```ignore
/// let binary = ImageEnhancer::from_dynamic(&photo, config)
///     .upscale()
///     .equalize()
///     .binarize()
///     .into_gray();
/// ```
pub struct ImageEnhancer {
    /// The working image, always single-channel.
    image: GrayImage,
    config: EnhanceConfig,
}

impl ImageEnhancer {
    // -- Construction ---------------------------------------------------------

    /// Start from any decoded image; colour sources are converted to luma.
    pub fn from_dynamic(image: &DynamicImage, config: EnhanceConfig) -> Self {
        let gray = match image {
            DynamicImage::ImageLuma8(gray) => gray.clone(),
            other => other.to_luma8(),
        };
        Self {
            image: gray,
            config,
        }
    }

    /// Start from an image that is already grayscale.
    pub fn from_gray(image: GrayImage, config: EnhanceConfig) -> Self {
        Self { image, config }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn as_gray(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_gray(self) -> GrayImage {
        self.image
    }

    // -- Pipeline -------------------------------------------------------------

    /// Run the full enhancement pipeline:
    ///
    /// 1. Upscale by `upscale_factor` (Catmull-Rom)
    /// 2. CLAHE with an 8x8 tile grid
    /// 3. Adaptive threshold (block 11, bias 2), ink = 255
    ///
    /// Output dimensions are the input dimensions times the upscale factor.
    #[instrument(skip(self), fields(width = self.image.width(), height = self.image.height()))]
    pub fn enhance(self) -> GrayImage {
        info!("Running sheet enhancement pipeline");
        self.upscale().equalize().binarize().into_gray()
    }

    /// Uniform upscale with a cubic kernel. Thin timing marks survive
    /// thresholding better at the higher resolution.
    pub fn upscale(self) -> Self {
        let factor = self.config.upscale_factor;
        if (factor - 1.0).abs() < f32::EPSILON {
            return self;
        }
        let (w, h) = self.image.dimensions();
        let new_w = (w as f32 * factor).round().max(1.0) as u32;
        let new_h = (h as f32 * factor).round().max(1.0) as u32;
        let resized = imageops::resize(&self.image, new_w, new_h, FilterType::CatmullRom);
        debug!(new_w, new_h, factor, "Upscaled");
        Self {
            image: resized,
            config: self.config,
        }
    }

    /// Contrast-limited adaptive histogram equalization.
    pub fn equalize(self) -> Self {
        let image = clahe(
            &self.image,
            self.config.clahe_tile_grid,
            self.config.clahe_clip_limit,
        );
        debug!(
            tiles = self.config.clahe_tile_grid,
            clip = self.config.clahe_clip_limit,
            "CLAHE applied"
        );
        Self {
            image,
            config: self.config,
        }
    }

    /// Local-mean adaptive threshold. Pixels darker than their neighbourhood
    /// mean minus the bias become foreground (255).
    pub fn binarize(self) -> Self {
        let image = adaptive_threshold(
            &self.image,
            self.config.threshold_block_size,
            self.config.threshold_bias,
        );
        Self {
            image,
            config: self.config,
        }
    }
}

// -- Adaptive threshold -------------------------------------------------------

/// Binarize `gray` against the mean of a `block_size` x `block_size`
/// neighbourhood. Pixels at or below `mean - bias` become 255 (foreground),
/// all others 0.
pub fn adaptive_threshold(gray: &GrayImage, block_size: u32, bias: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let radius = block_size / 2;
    let integral = compute_integral_image(gray);

    GrayImage::from_fn(width, height, |x, y| {
        let local_mean = region_mean(&integral, width, height, x, y, radius);
        let pixel = gray.get_pixel(x, y).0[0] as f64;
        if pixel <= local_mean - bias as f64 {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Compute the integral (summed-area table) of a grayscale image.
///
/// `integral[y * (width+1) + x]` contains the sum of all pixel values in the
/// rectangle [0, 0) to (x, y) (exclusive on both axes). The table has
/// dimensions `(width+1) x (height+1)` with a zero-padded border.
fn compute_integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum: u64 = 0;
        for x in 0..w {
            row_sum += gray.get_pixel(x, y).0[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            let above = y as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[above];
        }
    }

    table
}

/// Mean pixel value within a square region centred on (cx, cy), clamped to
/// the image bounds.
fn region_mean(
    integral: &[u64],
    img_width: u32,
    img_height: u32,
    cx: u32,
    cy: u32,
    radius: u32,
) -> f64 {
    let stride = (img_width + 1) as usize;

    let x1 = cx.saturating_sub(radius) as usize;
    let y1 = cy.saturating_sub(radius) as usize;
    let x2 = ((cx + radius + 1) as usize).min(img_width as usize);
    let y2 = ((cy + radius + 1) as usize).min(img_height as usize);

    let area = ((x2 - x1) * (y2 - y1)) as f64;
    if area == 0.0 {
        return 128.0;
    }

    let sum = integral[y2 * stride + x2] as f64
        - integral[y1 * stride + x2] as f64
        - integral[y2 * stride + x1] as f64
        + integral[y1 * stride + x1] as f64;

    sum / area
}

// -- CLAHE --------------------------------------------------------------------

/// Contrast-limited adaptive histogram equalization over a `grid` x `grid`
/// tile layout, with bilinear blending between neighbouring tile mappings.
///
/// `clip_limit` is relative to the mean bin height of a tile, so 1.0 clips
/// every bin at `tile_area / 256`.
pub fn clahe(gray: &GrayImage, grid: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let grid = grid.max(1);
    let tile_w = width.div_ceil(grid);
    let tile_h = height.div_ceil(grid);
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    // One 256-entry lookup table per tile.
    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts[(ty * tiles_x + tx) as usize] = tile_lut(gray, x0, y0, x1, y1, clip_limit);
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        // Position in tile-center coordinates.
        let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let tx0 = fx.floor().clamp(0.0, (tiles_x - 1) as f32) as u32;
        let ty0 = fy.floor().clamp(0.0, (tiles_y - 1) as f32) as u32;
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let ax = (fx - tx0 as f32).clamp(0.0, 1.0);
        let ay = (fy - ty0 as f32).clamp(0.0, 1.0);

        let v = gray.get_pixel(x, y).0[0] as usize;
        let lut = |tx: u32, ty: u32| luts[(ty * tiles_x + tx) as usize][v] as f32;

        let top = lut(tx0, ty0) * (1.0 - ax) + lut(tx1, ty0) * ax;
        let bottom = lut(tx0, ty1) * (1.0 - ax) + lut(tx1, ty1) * ax;
        let value = top * (1.0 - ay) + bottom * ay;
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Clipped-histogram equalization mapping for one tile.
fn tile_lut(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[gray.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let area = (x1 - x0) * (y1 - y0);

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in histogram.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        // Redistribute the clipped mass evenly, remainder spread across bins.
        let per_bin = excess / 256;
        let remainder = (excess % 256) as usize;
        for bin in histogram.iter_mut() {
            *bin += per_bin;
        }
        if remainder > 0 {
            let step = (256 / remainder).max(1);
            for i in (0..256).step_by(step).take(remainder) {
                histogram[i] += 1;
            }
        }
    }

    let mut lut = [0u8; 256];
    let scale = 255.0 / area.max(1) as f32;
    let mut cumulative = 0u32;
    for (value, &count) in histogram.iter().enumerate() {
        cumulative += count;
        lut[value] = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn output_is_upscaled_and_binary() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([200, 190, 180])));
        let binary = ImageEnhancer::from_dynamic(&img, EnhanceConfig::default()).enhance();

        assert_eq!(binary.dimensions(), (80, 60));
        assert!(binary.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn uniform_page_has_no_foreground() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([220])));
        let binary = ImageEnhancer::from_dynamic(&img, EnhanceConfig::default()).enhance();
        assert!(binary.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn dark_mark_becomes_foreground() {
        let mut gray = GrayImage::from_pixel(60, 60, Luma([230]));
        for y in 25..35 {
            for x in 25..35 {
                gray.put_pixel(x, y, Luma([20]));
            }
        }
        let binary = adaptive_threshold(&gray, 11, 2);
        // Mark edge sits next to bright paper, so it is darker than the local mean.
        assert_eq!(binary.get_pixel(25, 30).0[0], 255);
        // Paper far from the mark stays background.
        assert_eq!(binary.get_pixel(5, 5).0[0], 0);
    }

    #[test]
    fn unit_upscale_is_identity() {
        let gray = GrayImage::from_pixel(17, 9, Luma([100]));
        let config = EnhanceConfig {
            upscale_factor: 1.0,
            ..EnhanceConfig::default()
        };
        let out = ImageEnhancer::from_gray(gray, config).upscale().into_gray();
        assert_eq!(out.dimensions(), (17, 9));
    }

    #[test]
    fn clahe_stretches_low_contrast_tile() {
        let gray = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 8) as u8]));
        let out = clahe(&gray, 8, 40.0);
        let min = out.pixels().map(|p| p.0[0]).min().unwrap_or(0);
        let max = out.pixels().map(|p| p.0[0]).max().unwrap_or(0);
        assert!(max - min > 100, "expected stretched range, got {min}..{max}");
    }

    #[test]
    fn clahe_preserves_dimensions_for_tiny_images() {
        let gray = GrayImage::from_pixel(3, 5, Luma([50]));
        assert_eq!(clahe(&gray, 8, 2.0).dimensions(), (3, 5));
    }
}
