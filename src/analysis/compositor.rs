// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Transport encoding of the annotated rendering.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, RgbImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to encode annotated image as PNG: {0}")]
    Png(#[from] image::ImageError),
}

/// Encode an RGB rendering as a lossless PNG, then base64 for transport.
///
/// The input is packed RGB8; the PNG encoder consumes the same channel
/// order, so no swizzling happens here.
pub fn encode_png_base64(image: &RgbImage) -> Result<String, EncodeError> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(STANDARD.encode(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_round_trip_preserves_dimensions_and_pixels() {
        let mut img = RgbImage::from_pixel(20, 10, Rgb([0, 0, 0]));
        img.put_pixel(3, 4, Rgb([255, 0, 0]));

        let encoded = encode_png_base64(&img).unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();

        assert_eq!(decoded.width(), 20);
        assert_eq!(decoded.height(), 10);
        assert_eq!(decoded.get_pixel(3, 4), &Rgb([255, 0, 0]));
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }
}
