// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end reading of rendered sheets through the batch pipeline.

use bubblescan_core::types::{Answer, AnswerVector, Corners, Point};
use bubblescan_core::ScanConfig;
use bubblescan_vision::{PaperCornerDetector, RawImage, SheetReader};
use image::{DynamicImage, GrayImage, Luma};

const WIDTH: u32 = 400;
const HEIGHT: u32 = 600;
const PAPER: u8 = 245;
const INK: u8 = 20;

/// Sheet layout in original pixels: 2 blocks x 20 rows x 4 options.
/// After the default 2x upscale the answer area starts at (40, 60) with
/// 360px blocks, so here blocks are 180px wide from x = 20.
fn block_x(block: u32) -> u32 {
    20 + block * 180
}

fn row_center(row: u32) -> u32 {
    45 + row * 25
}

fn fill(img: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, value: u8) {
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, Luma([value]));
        }
    }
}

/// Horizontal hatching, five ink rows to one paper row.
fn hatch(img: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
    for y in y0..y1 {
        if y % 6 != 5 {
            for x in x0..x1 {
                img.put_pixel(x, y, Luma([INK]));
            }
        }
    }
}

/// Render a sheet where each question's chosen option is the one cell left
/// unprinted. `None` leaves every cell printed.
fn render_sheet(answers: &[Option<u32>]) -> GrayImage {
    let mut img = GrayImage::from_pixel(WIDTH, HEIGHT, Luma([PAPER]));
    for block in 0..2u32 {
        let bx = block_x(block);
        for row in 0..20u32 {
            let cy = row_center(row);
            // Timing mark in the block's left strip.
            fill(&mut img, bx + 2, cy - 2, bx + 16, cy + 3, INK);

            let chosen = answers[(block * 20 + row) as usize];
            for option in 0..4u32 {
                if Some(option) == chosen {
                    continue;
                }
                let cell_x = bx + option * 45;
                let left = if option == 0 { bx + 20 } else { cell_x + 4 };
                hatch(&mut img, left, cy - 10, cell_x + 41, cy + 10);
            }
        }
    }
    img
}

fn expected_pattern() -> Vec<Option<u32>> {
    (0..40u32)
        .map(|q| if q % 7 == 6 { None } else { Some(q % 4) })
        .collect()
}

fn as_vector(pattern: &[Option<u32>]) -> AnswerVector {
    pattern
        .iter()
        .map(|a| match a {
            Some(i) => Answer::Answered(*i as usize),
            None => Answer::Unanswered,
        })
        .collect()
}

#[test]
fn rendered_sheet_reads_back_its_answers() {
    let pattern = expected_pattern();
    let sheet = DynamicImage::ImageLuma8(render_sheet(&pattern));
    let reader = SheetReader::new(ScanConfig::default()).expect("default config is valid");

    let reading = reader.read_dynamic(&sheet);

    assert_eq!(reading.fallback_blocks, 0, "timing marks should be found");
    assert!(!reading.used_grid_fallback);
    assert_eq!(reading.answers, as_vector(&pattern));
}

#[test]
fn raw_rgb_buffer_reads_like_the_decoded_image() {
    let pattern = expected_pattern();
    let rgb = DynamicImage::ImageLuma8(render_sheet(&pattern)).to_rgb8();
    let raw = RawImage::new(WIDTH, HEIGHT, 3, rgb.into_raw()).expect("consistent buffer");
    let reader = SheetReader::new(ScanConfig::default()).expect("default config is valid");

    let reading = reader.read(raw).expect("valid raster");
    assert_eq!(reading.answers, as_vector(&pattern));
}

#[test]
fn sheet_on_a_desk_is_found_and_rectified() {
    // Place the sheet on a dark desk, then recover it through detection and
    // rectification back onto a 400x600 canvas.
    let pattern = expected_pattern();
    let sheet = render_sheet(&pattern);
    let mut frame = GrayImage::from_pixel(560, 760, Luma([25]));
    image::imageops::overlay(&mut frame, &sheet, 80, 80);
    let frame = DynamicImage::ImageLuma8(frame);

    let corners = PaperCornerDetector::default()
        .detect(&frame)
        .expect("sheet outline");
    let tl = corners.top_left();
    assert!((tl.x - 80.0).abs() < 20.0 && (tl.y - 80.0).abs() < 20.0, "{corners:?}");

    // Rectify with the true outline so the grid lines up exactly.
    let mut config = ScanConfig::default();
    config.rectify.width = WIDTH;
    config.rectify.height = HEIGHT;
    let reader = SheetReader::new(config).expect("valid config");
    let exact = Corners([
        Point::new(80.0, 80.0),
        Point::new(480.0, 80.0),
        Point::new(480.0, 680.0),
        Point::new(80.0, 680.0),
    ]);
    let reading = reader.read_frame(&frame, &exact).expect("rectifiable");
    assert_eq!(reading.answers.len(), 40);
    assert_eq!(reading.fallback_blocks, 0);
}
