// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Quality metrics derived from a detection set and image content.
//!
//! All four scores are integers on a fixed 0-100 scale, clamped after
//! rounding (`f64::round`, half away from zero) regardless of what the
//! intermediate arithmetic produces.

use std::collections::HashMap;

use image::imageops::FilterType;
use image::DynamicImage;

use super::detection::{round3, Detection};

/// Longer dimension of the luminance thumbnail
const LUMA_MAX_DIM: u32 = 256;

/// Box-area ratios at or above this value map to sharpness 0
const SHARPNESS_RATIO_CAP: f64 = 0.5;

/// Detection-count contribution saturates at 20 boxes / 70 points
const DETAILS_BOX_POINTS: f64 = 70.0;
const DETAILS_BOX_SATURATION: f64 = 21.0;

/// Class-diversity contribution: 6 points per distinct class, max 30
const DETAILS_CLASS_POINTS: usize = 6;
const DETAILS_CLASS_CAP: usize = 30;

/// Read-only summary of one detection set plus image content
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub quality: u32,
    pub sharpness: u32,
    pub light: u32,
    pub details: u32,
    pub total_detections: usize,
    pub avg_confidence: f64,
    pub class_distribution: HashMap<String, usize>,
}

/// Compute all metrics for one request.
pub fn compute_metrics(detections: &[Detection], image: &DynamicImage) -> Metrics {
    let total = detections.len();
    let avg_confidence = if total == 0 {
        0.0
    } else {
        detections.iter().map(|d| d.confidence).sum::<f64>() / total as f64
    };

    let class_distribution = class_distribution(detections);
    let unique_classes = class_distribution.len();

    Metrics {
        quality: quality_score(avg_confidence),
        sharpness: sharpness_score(detections, image.width(), image.height()),
        light: light_score(image),
        details: details_score(total, unique_classes),
        total_detections: total,
        avg_confidence: round3(avg_confidence),
        class_distribution,
    }
}

/// Occurrence count per distinct class label.
pub fn class_distribution(detections: &[Detection]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for d in detections {
        *counts.entry(d.class_label.clone()).or_insert(0) += 1;
    }
    counts
}

/// Average detector confidence projected onto 0-100.
pub fn quality_score(avg_confidence: f64) -> u32 {
    clamp_score(avg_confidence * 100.0)
}

/// Inverse of the mean box-area ratio: detections that fill a larger share
/// of the frame score lower, with ratios >= 0.5 all mapping to 0.
pub fn sharpness_score(detections: &[Detection], width: u32, height: u32) -> u32 {
    if detections.is_empty() {
        return 0;
    }

    let frame_area = width as f64 * height as f64;
    let mean_ratio = detections
        .iter()
        .map(|d| {
            if frame_area > 0.0 {
                (d.width() * d.height()) / frame_area
            } else {
                1.0
            }
        })
        .sum::<f64>()
        / detections.len() as f64;

    clamp_score((1.0 - mean_ratio.min(SHARPNESS_RATIO_CAP) / SHARPNESS_RATIO_CAP) * 100.0)
}

/// Mean luminance of a bounded thumbnail, projected onto 0-100.
pub fn light_score(image: &DynamicImage) -> u32 {
    // Thumbnail only bounds compute cost; small images are not upscaled
    let luma = if image.width().max(image.height()) > LUMA_MAX_DIM {
        image
            .resize(LUMA_MAX_DIM, LUMA_MAX_DIM, FilterType::Triangle)
            .to_luma8()
    } else {
        image.to_luma8()
    };

    let pixels = luma.as_raw();
    if pixels.is_empty() {
        return 0;
    }
    let mean = pixels.iter().map(|&p| p as u64).sum::<u64>() as f64 / pixels.len() as f64;

    clamp_score(mean / 255.0 * 100.0)
}

/// Detection count on a diminishing-returns curve (up to 70 points) plus
/// class diversity (6 points per distinct class, up to 30).
pub fn details_score(total: usize, unique_classes: usize) -> u32 {
    let box_part = if total == 0 {
        0.0
    } else {
        DETAILS_BOX_POINTS * ((1.0 + total as f64).log10() / DETAILS_BOX_SATURATION.log10())
    };
    let cls_part = DETAILS_CLASS_CAP.min(unique_classes * DETAILS_CLASS_POINTS) as f64;

    clamp_score(box_part + cls_part)
}

fn clamp_score(v: f64) -> u32 {
    v.round().clamp(0.0, 100.0) as u32
}
