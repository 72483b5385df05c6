// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration collected from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::detector::Device;

/// Maximum accepted upload size (10MB)
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Runtime configuration for the node.
///
/// Every field has a default so the node starts with no environment set;
/// values are read once in `main` and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port for the HTTP API
    pub api_port: u16,
    /// Path to the ONNX damage-detection model
    pub model_path: PathBuf,
    /// Path to the newline-delimited class labels file
    pub labels_path: PathBuf,
    /// Requested inference device (CUDA falls back to CPU if unavailable)
    pub device: Device,
    /// Square input size of the model
    pub input_size: u32,
    /// Minimum confidence for a detection to be kept
    pub conf_threshold: f32,
    /// IoU threshold for non-maximum suppression
    pub iou_threshold: f32,
    /// Cap on detections returned per image
    pub max_detections: usize,
    /// Budget for a single detector invocation
    pub detect_timeout: Duration,
    /// Optional TTF font for overlay labels; boxes only when unset
    pub font_path: Option<PathBuf>,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
}

impl NodeConfig {
    /// Build the configuration from environment variables, with defaults.
    pub fn from_env() -> Self {
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8000);

        let model_path = env::var("MODEL_PATH")
            .unwrap_or_else(|_| "./models/damage-yolov8.onnx".to_string());
        let labels_path =
            env::var("LABELS_PATH").unwrap_or_else(|_| "./models/labels.txt".to_string());

        let device = match env::var("DETECTOR_DEVICE").as_deref() {
            Ok("cpu") | Ok("CPU") => Device::Cpu,
            _ => Device::Cuda,
        };

        let input_size = env::var("DETECTOR_INPUT_SIZE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(640);

        let conf_threshold = env::var("CONF_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(0.25);

        let iou_threshold = env::var("IOU_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(0.45);

        let max_detections = env::var("MAX_DETECTIONS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(300);

        let detect_timeout_secs = env::var("DETECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let font_path = env::var("FONT_PATH").ok().map(PathBuf::from);

        Self {
            api_port,
            model_path: PathBuf::from(model_path),
            labels_path: PathBuf::from(labels_path),
            device,
            input_size,
            conf_threshold,
            iou_threshold,
            max_detections,
            detect_timeout: Duration::from_secs(detect_timeout_secs),
            font_path,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_environment() {
        // Fields not driven by this test's environment fall back to defaults
        let config = NodeConfig::from_env();
        assert!(config.input_size > 0);
        assert!(config.conf_threshold > 0.0 && config.conf_threshold < 1.0);
        assert!(config.detect_timeout >= Duration::from_secs(1));
        assert_eq!(config.max_upload_bytes, MAX_UPLOAD_BYTES);
    }
}
