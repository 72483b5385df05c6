// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Object-detection collaborator interface and the bundled ONNX backend.
//!
//! The pipeline depends only on [`ObjectDetector`]; which backend sits
//! behind it (and on which device) is decided at construction time.

pub mod overlay;
pub mod yolo;

use image::{DynamicImage, RgbImage};
use thiserror::Error;

pub use yolo::YoloDetector;

/// Inference device requested for the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

/// One raw box as emitted by the detector, before normalization.
///
/// Coordinates are `(x1, y1, x2, y2)` in source-image pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("failed to load detector model: {0}")]
    ModelLoad(String),

    #[error("failed to load class labels: {0}")]
    Labels(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Detector collaborator consumed by the analysis endpoint.
///
/// Implementations are not assumed safe for concurrent invocation against
/// one accelerator context; callers serialize `detect`/`render` pairs.
/// `render` draws overlays onto a copy of the input and returns packed
/// RGB8 -- the channel order the compositor encodes as-is.
pub trait ObjectDetector: Send + Sync {
    /// Human-readable model identifier for health reporting and logs.
    fn model_name(&self) -> &str;

    /// Run inference on a decoded image, returning raw boxes in the
    /// source image's pixel space, in the backend's emission order.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, DetectorError>;

    /// Produce a copy of `image` with boxes (and labels where available)
    /// drawn for every detection. Never mutates the input.
    fn render(&self, image: &DynamicImage, detections: &[RawDetection]) -> RgbImage;
}
