// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upload decoding helpers: size guard, format sniffing, pixel decode.

use image::{DynamicImage, ImageFormat};
use thiserror::Error;

use crate::config::MAX_UPLOAD_BYTES;

/// Errors produced while turning uploaded bytes into pixels
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("uploaded image is empty")]
    EmptyData,

    #[error("uploaded image is too large: {0} bytes (max: {1} bytes)")]
    TooLarge(usize, usize),

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("failed to decode image: {0}")]
    Malformed(String),
}

/// A decoded upload plus the metadata the pipeline needs
pub struct DecodedImage {
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub size_bytes: usize,
}

/// Decode raw uploaded bytes into a pixel buffer.
///
/// The format is sniffed from magic bytes before the full decode so that
/// arbitrary non-image payloads are rejected cheaply.
pub fn decode_upload(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyData);
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(DecodeError::TooLarge(bytes.len(), MAX_UPLOAD_BYTES));
    }

    let format = detect_format(bytes)?;

    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    Ok(DecodedImage {
        width: image.width(),
        height: image.height(),
        format,
        size_bytes: bytes.len(),
        image,
    })
}

/// Detect image format from magic bytes
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, DecodeError> {
    if bytes.len() < 4 {
        return Err(DecodeError::UnsupportedFormat);
    }

    match bytes {
        // PNG: 89 50 4E 47 (0x89 P N G)
        [0x89, 0x50, 0x4E, 0x47, ..] => Ok(ImageFormat::Png),

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Ok(ImageFormat::Jpeg),

        // WebP: RIFF .... WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Ok(ImageFormat::WebP),

        // GIF: GIF87a or GIF89a
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Ok(ImageFormat::Gif),

        // BMP: BM
        [0x42, 0x4D, ..] => Ok(ImageFormat::Bmp),

        _ => Err(DecodeError::UnsupportedFormat),
    }
}
