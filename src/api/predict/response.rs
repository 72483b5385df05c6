// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Predict endpoint response types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::analysis::{Detection, Metrics};

/// One detection on the wire: `(x1, y1, x2, y2)` pixel coordinates,
/// confidence in [0, 1], class label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionDto {
    pub bbox: [f64; 4],
    pub confidence: f64,
    #[serde(rename = "class")]
    pub class_label: String,
}

impl From<&Detection> for DetectionDto {
    fn from(d: &Detection) -> Self {
        Self {
            bbox: d.bbox,
            confidence: d.confidence,
            class_label: d.class_label.clone(),
        }
    }
}

/// The four 0-100 scores plus summary statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsDto {
    pub quality: u32,
    pub sharpness: u32,
    pub light: u32,
    pub details: u32,
    pub total_detections: usize,
    pub avg_confidence: f64,
    pub class_distribution: HashMap<String, usize>,
}

impl From<Metrics> for MetricsDto {
    fn from(m: Metrics) -> Self {
        Self {
            quality: m.quality,
            sharpness: m.sharpness,
            light: m.light,
            details: m.details,
            total_detections: m.total_detections,
            avg_confidence: m.avg_confidence,
            class_distribution: m.class_distribution,
        }
    }
}

/// Source image dimensions in pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImageSize {
    pub w: u32,
    pub h: u32,
}

/// Full analysis result for one uploaded image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub detections: Vec<DetectionDto>,
    pub metrics: MetricsDto,
    pub image_size: ImageSize,
    /// Base64-encoded PNG with bounding boxes drawn
    pub image_base64: String,
}
