// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// bubblescan-vision: image-to-answer extraction for photographed bubble sheets.
//
// Provides image enhancement (grayscale, upscale, CLAHE, adaptive binarization),
// timing-mark row recovery with a uniform-grid fallback, per-bubble darkness
// decisions, paper corner detection and perspective rectification for live
// capture, and diagnostic overlays.

pub mod corners;
pub mod enhance;
pub mod extract;
pub mod geometry;
pub mod overlay;
pub mod pipeline;
pub mod raster;
pub mod rectify;
pub mod region;
pub mod rows;

// Re-export the primary structs so callers can use `bubblescan_vision::SheetReader` etc.
pub use corners::PaperCornerDetector;
pub use enhance::ImageEnhancer;
pub use extract::{AnswerExtractor, RowShortfall};
pub use geometry::order_corners;
pub use pipeline::{SheetReader, SheetReading};
pub use raster::RawImage;
pub use rectify::PerspectiveRectifier;
pub use region::AnswerRegion;
pub use rows::{RowDetection, RowLocator, RowSource};
