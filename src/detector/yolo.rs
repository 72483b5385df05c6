// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX Runtime backend for the YOLO damage model.
//!
//! Loads a YOLOv8-layout ONNX export (output `[1, 4 + classes, anchors]`)
//! with CUDA when requested and available, falling back to CPU otherwise.
//! Class ids resolve to labels through a newline-delimited labels file, so
//! the label set is deployment configuration rather than code.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info, warn};

use super::overlay::Overlay;
use super::{Device, DetectorError, ObjectDetector, RawDetection};
use crate::config::NodeConfig;

/// YOLO ONNX session plus everything needed to decode its output.
///
/// The session is kept behind a `Mutex`: ONNX Runtime does not document
/// concurrent `run` calls against one accelerator context as safe.
pub struct YoloDetector {
    session: Mutex<Session>,
    labels: Vec<String>,
    model_name: String,
    input_size: u32,
    conf_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
    overlay: Overlay,
}

/// One decoded proposal before labels are attached.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
    class_id: usize,
}

impl Candidate {
    fn iou(&self, other: &Candidate) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let area_a = (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0);
        let area_b = (other.x2 - other.x1).max(0.0) * (other.y2 - other.y1).max(0.0);
        let union = area_a + area_b - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

impl YoloDetector {
    /// Load the model, labels and overlay resources described by `config`.
    pub fn load(config: &NodeConfig) -> Result<Self, DetectorError> {
        let labels = load_labels(&config.labels_path)?;
        info!(
            "Loaded {} damage classes from {}",
            labels.len(),
            config.labels_path.display()
        );

        let session = match config.device {
            Device::Cuda => match build_session(&config.model_path, true) {
                Ok(session) => {
                    info!("Detector session initialized with CUDA execution provider");
                    session
                }
                Err(e) => {
                    warn!("CUDA execution provider unavailable ({}), falling back to CPU", e);
                    build_session(&config.model_path, false)?
                }
            },
            Device::Cpu => build_session(&config.model_path, false)?,
        };

        let model_name = config
            .model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "damage-yolo".to_string());

        Ok(Self {
            session: Mutex::new(session),
            labels,
            model_name,
            input_size: config.input_size,
            conf_threshold: config.conf_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
            overlay: Overlay::new(config.font_path.as_deref()),
        })
    }
}

impl ObjectDetector for YoloDetector {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, DetectorError> {
        let input = preprocess(image, self.input_size);
        let tensor = Tensor::from_array((
            [1usize, 3, self.input_size as usize, self.input_size as usize],
            input.into_boxed_slice(),
        ))
        .map_err(|e| DetectorError::Inference(e.to_string()))?
        .into_dyn();

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectorError::Inference("detector session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs!["images" => tensor])
            .map_err(|e| DetectorError::Inference(e.to_string()))?;

        let (_shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::Inference(e.to_string()))?;

        let scale_x = image.width() as f32 / self.input_size as f32;
        let scale_y = image.height() as f32 / self.input_size as f32;

        let candidates = decode_output(
            data,
            self.labels.len(),
            self.conf_threshold,
            scale_x,
            scale_y,
            image.width() as f32,
            image.height() as f32,
        );
        let kept = nms(candidates, self.iou_threshold, self.max_detections);
        debug!("{} candidates kept after NMS", kept.len());

        Ok(kept
            .into_iter()
            .map(|c| RawDetection {
                x1: c.x1,
                y1: c.y1,
                x2: c.x2,
                y2: c.y2,
                confidence: c.score,
                class_id: c.class_id,
                class_name: self
                    .labels
                    .get(c.class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", c.class_id)),
            })
            .collect())
    }

    fn render(&self, image: &DynamicImage, detections: &[RawDetection]) -> RgbImage {
        self.overlay.draw(image, detections)
    }
}

fn build_session(model_path: &Path, cuda: bool) -> Result<Session, DetectorError> {
    let builder = Session::builder()
        .map_err(|e| DetectorError::ModelLoad(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| DetectorError::ModelLoad(e.to_string()))?;

    let builder = if cuda {
        builder.with_execution_providers([CUDAExecutionProvider::default().build()])
    } else {
        builder.with_execution_providers([CPUExecutionProvider::default().build()])
    }
    .map_err(|e| DetectorError::ModelLoad(e.to_string()))?;

    builder
        .commit_from_file(model_path)
        .map_err(|e| DetectorError::ModelLoad(e.to_string()))
}

fn load_labels(path: &Path) -> Result<Vec<String>, DetectorError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| DetectorError::Labels(format!("{}: {}", path.display(), e)))?;
    let labels: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        return Err(DetectorError::Labels(format!(
            "{}: no class labels found",
            path.display()
        )));
    }
    Ok(labels)
}

/// Resize to the model's square input and pack as NCHW f32 in [0, 1].
fn preprocess(image: &DynamicImage, input_size: u32) -> Vec<f32> {
    let resized = image::imageops::resize(
        &image.to_rgb8(),
        input_size,
        input_size,
        FilterType::Triangle,
    );

    let plane = (input_size * input_size) as usize;
    let mut data = vec![0f32; 3 * plane];
    let raw = resized.as_raw();
    for idx in 0..plane {
        data[idx] = raw[idx * 3] as f32 / 255.0;
        data[plane + idx] = raw[idx * 3 + 1] as f32 / 255.0;
        data[2 * plane + idx] = raw[idx * 3 + 2] as f32 / 255.0;
    }
    data
}

/// Decode the `[1, 4 + classes, anchors]` output tensor.
///
/// Rows are column-major across anchors: `[cx, cy, w, h, cls0, cls1, ...]`.
/// Proposals below `conf_threshold` are dropped; the rest are scaled back
/// into source-image pixel space and clamped to the frame.
fn decode_output(
    data: &[f32],
    num_classes: usize,
    conf_threshold: f32,
    scale_x: f32,
    scale_y: f32,
    src_w: f32,
    src_h: f32,
) -> Vec<Candidate> {
    let rows = 4 + num_classes;
    if rows == 4 || data.len() < rows {
        return Vec::new();
    }
    let anchors = data.len() / rows;

    let mut candidates = Vec::new();
    for i in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = 0f32;
        for c in 0..num_classes {
            let s = data[(4 + c) * anchors + i];
            if s > best_score {
                best_score = s;
                best_class = c;
            }
        }
        if best_score < conf_threshold {
            continue;
        }

        let cx = data[i];
        let cy = data[anchors + i];
        let w = data[2 * anchors + i];
        let h = data[3 * anchors + i];

        candidates.push(Candidate {
            x1: ((cx - w / 2.0) * scale_x).clamp(0.0, src_w),
            y1: ((cy - h / 2.0) * scale_y).clamp(0.0, src_h),
            x2: ((cx + w / 2.0) * scale_x).clamp(0.0, src_w),
            y2: ((cy + h / 2.0) * scale_y).clamp(0.0, src_h),
            score: best_score,
            class_id: best_class,
        });
    }
    candidates
}

/// Greedy class-aware NMS: sort by score descending, suppress same-class
/// boxes whose IoU exceeds the threshold, cap at `max_detections`.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32, max_detections: usize) -> Vec<Candidate> {
    candidates.sort_unstable_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Candidate> = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(candidates[i]);
        if kept.len() == max_detections {
            break;
        }
        for j in (i + 1)..candidates.len() {
            if candidates[j].class_id == candidates[i].class_id
                && candidates[i].iou(&candidates[j]) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize) -> Candidate {
        Candidate {
            x1,
            y1,
            x2,
            y2,
            score,
            class_id,
        }
    }

    /// Build a column-major [4 + classes, anchors] output buffer.
    fn output_buffer(anchors: usize, num_classes: usize, proposals: &[(f32, f32, f32, f32, usize, f32)]) -> Vec<f32> {
        let rows = 4 + num_classes;
        let mut data = vec![0f32; rows * anchors];
        for (i, &(cx, cy, w, h, class_id, score)) in proposals.iter().enumerate() {
            data[i] = cx;
            data[anchors + i] = cy;
            data[2 * anchors + i] = w;
            data[3 * anchors + i] = h;
            data[(4 + class_id) * anchors + i] = score;
        }
        data
    }

    #[test]
    fn test_decode_thresholds_and_scales() {
        // Two proposals in 640-space over a 1280x320 source
        let data = output_buffer(
            4,
            2,
            &[
                (320.0, 320.0, 100.0, 100.0, 0, 0.9),
                (100.0, 100.0, 50.0, 50.0, 1, 0.1),
            ],
        );
        let out = decode_output(&data, 2, 0.25, 2.0, 0.5, 1280.0, 320.0);

        assert_eq!(out.len(), 1);
        let c = out[0];
        assert_eq!(c.class_id, 0);
        assert_eq!(c.score, 0.9);
        assert_eq!((c.x1, c.x2), (540.0, 740.0));
        assert_eq!((c.y1, c.y2), (135.0, 185.0));
    }

    #[test]
    fn test_decode_clamps_to_frame() {
        let data = output_buffer(1, 1, &[(0.0, 0.0, 200.0, 200.0, 0, 0.8)]);
        let out = decode_output(&data, 1, 0.25, 1.0, 1.0, 640.0, 640.0);
        assert_eq!(out[0].x1, 0.0);
        assert_eq!(out[0].y1, 0.0);
    }

    #[test]
    fn test_decode_empty_output() {
        assert!(decode_output(&[], 3, 0.25, 1.0, 1.0, 640.0, 640.0).is_empty());
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap() {
        let kept = nms(
            vec![
                cand(0.0, 0.0, 100.0, 100.0, 0.9, 0),
                cand(5.0, 5.0, 105.0, 105.0, 0.8, 0),
                cand(300.0, 300.0, 400.0, 400.0, 0.7, 0),
            ],
            0.45,
            300,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.7);
    }

    #[test]
    fn test_nms_keeps_overlapping_distinct_classes() {
        let kept = nms(
            vec![
                cand(0.0, 0.0, 100.0, 100.0, 0.9, 0),
                cand(5.0, 5.0, 105.0, 105.0, 0.8, 1),
            ],
            0.45,
            300,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_orders_by_score_and_caps() {
        let kept = nms(
            vec![
                cand(0.0, 0.0, 10.0, 10.0, 0.5, 0),
                cand(200.0, 200.0, 210.0, 210.0, 0.95, 0),
                cand(400.0, 400.0, 410.0, 410.0, 0.7, 0),
            ],
            0.45,
            2,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.95);
        assert_eq!(kept[1].score, 0.7);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = cand(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        let b = cand(20.0, 20.0, 30.0, 30.0, 0.9, 0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_identical_is_one() {
        let a = cand(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_labels_skips_blank_lines() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scratch\n\ndent\n  rust  \n").unwrap();

        let labels = load_labels(file.path()).unwrap();
        assert_eq!(labels, ["scratch", "dent", "rust"]);
    }

    #[test]
    fn test_load_labels_rejects_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            load_labels(file.path()),
            Err(DetectorError::Labels(_))
        ));
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            32,
            16,
            image::Rgb([255, 128, 0]),
        ));
        let data = preprocess(&image, 8);
        assert_eq!(data.len(), 3 * 8 * 8);
        assert!(data.iter().all(|&v| (0.0..=1.0).contains(&v)));
        // Red plane first in NCHW layout
        assert!((data[0] - 1.0).abs() < 1e-6);
        assert!(data[2 * 64] < 0.01);
    }
}
