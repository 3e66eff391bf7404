// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw raster boundary: the decoded pixel buffer handed over by the camera
// or scanner.

use bubblescan_core::error::{Result, ScanError};
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use tracing::{debug, instrument};

/// A decoded, interleaved 8-bit pixel buffer.
///
/// Supported channel counts: 1 (luma), 2 (luma + alpha), 3 (RGB), 4 (RGBA).
#[derive(Debug, Clone)]
pub struct RawImage {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl RawImage {
    /// Wrap a pixel buffer, checking its length against the dimensions.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ScanError::InvalidImage(format!(
                "zero-sized raster {width}x{height}"
            )));
        }
        if !(1..=4).contains(&channels) {
            return Err(ScanError::InvalidImage(format!(
                "unsupported channel count {channels}"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(ScanError::InvalidImage(format!(
                "buffer holds {} bytes, {width}x{height}x{channels} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Copy the pixels out of an already-decoded `DynamicImage`.
    ///
    /// 16-bit and float images are narrowed to 8-bit RGBA.
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (channels, data) = match image {
            DynamicImage::ImageLuma8(img) => (1, img.as_raw().clone()),
            DynamicImage::ImageLumaA8(img) => (2, img.as_raw().clone()),
            DynamicImage::ImageRgb8(img) => (3, img.as_raw().clone()),
            other => (4, other.to_rgba8().into_raw()),
        };
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Convert into an `image` crate buffer without copying the pixels.
    #[instrument(skip(self), fields(width = self.width, height = self.height, channels = self.channels))]
    pub fn into_dynamic(self) -> Result<DynamicImage> {
        let (w, h) = (self.width, self.height);
        let size_err = || ScanError::InvalidImage("buffer does not match dimensions".into());
        let image = match self.channels {
            1 => DynamicImage::ImageLuma8(GrayImage::from_raw(w, h, self.data).ok_or_else(size_err)?),
            2 => DynamicImage::ImageLumaA8(
                GrayAlphaImage::from_raw(w, h, self.data).ok_or_else(size_err)?,
            ),
            3 => DynamicImage::ImageRgb8(RgbImage::from_raw(w, h, self.data).ok_or_else(size_err)?),
            4 => DynamicImage::ImageRgba8(RgbaImage::from_raw(w, h, self.data).ok_or_else(size_err)?),
            n => {
                return Err(ScanError::InvalidImage(format!(
                    "unsupported channel count {n}"
                )));
            }
        };
        debug!("Raw raster wrapped");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffer() {
        let err = RawImage::new(4, 4, 3, vec![0; 47]).unwrap_err();
        assert!(matches!(err, ScanError::InvalidImage(_)));
    }

    #[test]
    fn rejects_unsupported_channels() {
        assert!(RawImage::new(2, 2, 5, vec![0; 20]).is_err());
        assert!(RawImage::new(0, 2, 1, vec![]).is_err());
    }

    #[test]
    fn rgb_buffer_becomes_rgb_image() {
        let raw = RawImage::new(3, 2, 3, vec![10; 18]).expect("valid");
        let image = raw.into_dynamic().expect("convert");
        assert!(matches!(image, DynamicImage::ImageRgb8(_)));
        assert_eq!((image.width(), image.height()), (3, 2));
    }

    #[test]
    fn dynamic_round_trip_keeps_gray_layout() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(5, 7, image::Luma([42])));
        let raw = RawImage::from_dynamic(&gray);
        assert_eq!(raw.channels(), 1);
        assert_eq!(raw.as_bytes().len(), 35);
        let back = raw.into_dynamic().expect("convert");
        assert_eq!(back.to_luma8().get_pixel(4, 6).0[0], 42);
    }
}
