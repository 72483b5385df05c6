// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection normalization
//!
//! Converts the detector's raw per-box output into canonical records with
//! rounded, validated fields. The map is total and order-preserving: one
//! `Detection` per raw box, in the detector's emission order, with no
//! confidence filtering (the detector applies its own threshold).

use crate::detector::RawDetection;

/// One recognized object instance, immutable once produced.
///
/// Coordinates are `(x1, y1, x2, y2)` in source-image pixel space, rounded
/// to 2 decimals; confidence is rounded to 3 decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f64; 4],
    pub confidence: f64,
    pub class_label: String,
}

impl Detection {
    /// Box width, never negative even for an inverted box.
    pub fn width(&self) -> f64 {
        (self.bbox[2] - self.bbox[0]).max(0.0)
    }

    /// Box height, never negative even for an inverted box.
    pub fn height(&self) -> f64 {
        (self.bbox[3] - self.bbox[1]).max(0.0)
    }
}

/// Normalize raw detector output into an ordered detection set.
pub fn normalize_detections(raw: &[RawDetection]) -> Vec<Detection> {
    raw.iter()
        .map(|r| Detection {
            bbox: [
                round2(r.x1 as f64),
                round2(r.y1 as f64),
                round2(r.x2 as f64),
                round2(r.y2 as f64),
            ],
            confidence: round3((r.confidence as f64).clamp(0.0, 1.0)),
            class_label: r.class_name.clone(),
        })
        .collect()
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub(crate) fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32, name: &str) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence: conf,
            class_id: 0,
            class_name: name.to_string(),
        }
    }

    #[test]
    fn test_coordinates_rounded_to_two_decimals() {
        let out = normalize_detections(&[raw(10.12345, 20.6789, 110.555, 220.004, 0.87654, "scratch")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox, [10.12, 20.68, 110.56, 220.0]);
        assert_eq!(out[0].confidence, 0.877);
        assert_eq!(out[0].class_label, "scratch");
    }

    #[test]
    fn test_inverted_box_yields_zero_dimensions() {
        let out = normalize_detections(&[raw(100.0, 100.0, 40.0, 60.0, 0.5, "dent")]);
        assert_eq!(out[0].width(), 0.0);
        assert_eq!(out[0].height(), 0.0);
    }

    #[test]
    fn test_emission_order_preserved() {
        let out = normalize_detections(&[
            raw(0.0, 0.0, 10.0, 10.0, 0.2, "low"),
            raw(0.0, 0.0, 10.0, 10.0, 0.9, "high"),
            raw(0.0, 0.0, 10.0, 10.0, 0.5, "mid"),
        ]);
        let labels: Vec<_> = out.iter().map(|d| d.class_label.as_str()).collect();
        assert_eq!(labels, ["low", "high", "mid"]);
    }

    #[test]
    fn test_no_confidence_filtering() {
        let out = normalize_detections(&[raw(0.0, 0.0, 1.0, 1.0, 0.001, "faint")]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize_detections(&[]).is_empty());
    }

    #[test]
    fn test_confidence_clamped_into_unit_range() {
        let out = normalize_detections(&[raw(0.0, 0.0, 1.0, 1.0, 1.0004, "x")]);
        assert_eq!(out[0].confidence, 1.0);
    }
}
