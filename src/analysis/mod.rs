// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection-to-metrics pipeline
//!
//! This module turns raw detector output into the response payload:
//! - normalization of raw boxes into canonical `Detection` records
//! - the four bounded 0-100 quality scores plus summary statistics
//! - PNG/base64 encoding of the annotated rendering

pub mod compositor;
pub mod detection;
pub mod metrics;

pub use compositor::{encode_png_base64, EncodeError};
pub use detection::{normalize_detections, Detection};
pub use metrics::{compute_metrics, Metrics};
