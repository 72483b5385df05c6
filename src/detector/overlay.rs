// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bounding-box overlay rendering.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::warn;

use super::RawDetection;

const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // rough per-character width estimate
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

/// Per-class box colors, cycled by class id.
const BOX_PALETTE: [[u8; 3]; 6] = [
    [255, 56, 56],
    [255, 159, 32],
    [72, 249, 10],
    [0, 194, 255],
    [52, 69, 147],
    [255, 115, 131],
];

/// Draws detection boxes and label tags onto image copies.
///
/// A TTF font is optional; without one the overlay degrades to boxes only.
pub struct Overlay {
    font: Option<FontVec>,
}

impl Overlay {
    pub fn new(font_path: Option<&Path>) -> Self {
        let font = font_path.and_then(|path| match std::fs::read(path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(_) => {
                    warn!("{} is not a usable font, labels disabled", path.display());
                    None
                }
            },
            Err(e) => {
                warn!("Cannot read font {} ({}), labels disabled", path.display(), e);
                None
            }
        });
        Self { font }
    }

    /// Render boxes (and labels when a font is loaded) onto a copy of
    /// `image`; the input is never mutated.
    pub fn draw(&self, image: &DynamicImage, detections: &[RawDetection]) -> RgbImage {
        let mut canvas = image.to_rgb8();
        let (w, h) = (canvas.width() as i32, canvas.height() as i32);

        for det in detections {
            let color = Rgb(BOX_PALETTE[det.class_id % BOX_PALETTE.len()]);

            let x1 = (det.x1.floor() as i32).clamp(0, w - 1);
            let y1 = (det.y1.floor() as i32).clamp(0, h - 1);
            let x2 = (det.x2.ceil() as i32).clamp(0, w - 1);
            let y2 = (det.y2.ceil() as i32).clamp(0, h - 1);
            if x1 >= x2 || y1 >= y2 {
                continue;
            }

            for t in 0..BOX_THICKNESS {
                let bw = x2 - x1 - 2 * t;
                let bh = y2 - y1 - 2 * t;
                if bw <= 0 || bh <= 0 {
                    break;
                }
                let rect = Rect::at(x1 + t, y1 + t).of_size(bw as u32, bh as u32);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }

            if let Some(font) = &self.font {
                let label = format!("{} {:.2}", det.class_name, det.confidence);
                draw_label(&mut canvas, font, &label, x1, y1, color);
            }
        }

        canvas
    }
}

fn draw_label(canvas: &mut RgbImage, font: &FontVec, label: &str, x1: i32, y1: i32, color: Rgb<u8>) {
    let (w, _h) = (canvas.width() as i32, canvas.height() as i32);

    let text_width = (label.len() as f32 * LABEL_CHAR_WIDTH) as i32;
    let label_x = x1.max(0);
    let label_y = (y1 - LABEL_TEXT_HEIGHT).max(0);

    let max_width = (w - label_x).max(0);
    let label_width = text_width.min(max_width);
    if label_width <= 0 {
        return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width as u32, LABEL_TEXT_HEIGHT as u32);
    draw_filled_rect_mut(canvas, rect, color);

    draw_text_mut(
        canvas,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        PxScale::from(LABEL_FONT_SIZE),
        font,
        label,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x1: f32, y1: f32, x2: f32, y2: f32) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence: 0.9,
            class_id: 0,
            class_name: "scratch".to_string(),
        }
    }

    fn black_image(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([0, 0, 0])))
    }

    #[test]
    fn test_draw_marks_box_edges() {
        let overlay = Overlay::new(None);
        let rendered = overlay.draw(&black_image(64, 64), &[detection(10.0, 10.0, 40.0, 40.0)]);

        assert_ne!(rendered.get_pixel(10, 10), &Rgb([0, 0, 0]));
        assert_ne!(rendered.get_pixel(25, 10), &Rgb([0, 0, 0]));
        // Interior stays untouched
        assert_eq!(rendered.get_pixel(25, 25), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_preserves_dimensions() {
        let overlay = Overlay::new(None);
        let rendered = overlay.draw(&black_image(37, 21), &[detection(0.0, 0.0, 36.0, 20.0)]);
        assert_eq!((rendered.width(), rendered.height()), (37, 21));
    }

    #[test]
    fn test_draw_handles_out_of_bounds_box() {
        let overlay = Overlay::new(None);
        let rendered = overlay.draw(&black_image(32, 32), &[detection(-10.0, -10.0, 100.0, 100.0)]);
        assert_ne!(rendered.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_skips_degenerate_box() {
        let overlay = Overlay::new(None);
        let rendered = overlay.draw(&black_image(32, 32), &[detection(5.0, 5.0, 5.0, 5.0)]);
        assert_eq!(rendered.get_pixel(5, 5), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_missing_font_path_degrades_to_boxes() {
        let overlay = Overlay::new(Some(Path::new("/nonexistent/font.ttf")));
        let rendered = overlay.draw(&black_image(16, 16), &[detection(2.0, 2.0, 10.0, 10.0)]);
        assert_ne!(rendered.get_pixel(2, 2), &Rgb([0, 0, 0]));
    }
}
