// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Predict endpoint handler

use std::sync::Arc;

use axum::{extract::State, Json};
use axum_extra::extract::Multipart;
use tracing::{debug, info, warn};

use super::response::{DetectionDto, ImageSize, MetricsDto, PredictResponse};
use crate::analysis::{compute_metrics, encode_png_base64, normalize_detections};
use crate::api::errors::ApiError;
use crate::api::http_server::{ApiErrorResponse, AppState};
use crate::detector::DetectorError;
use crate::vision::decode_upload;

/// POST /predict/ - Analyze an uploaded image
///
/// Accepts a multipart form with one image file field and returns the
/// detections, the 0-100 quality metrics, the source dimensions and a
/// base64 PNG preview with boxes drawn.
///
/// # Errors
/// - 400 Bad Request: missing file field, or bytes that are not a
///   supported image (the detector is never invoked in that case)
/// - 500 Internal Server Error: detector or PNG encoding failure
/// - 504 Gateway Timeout: detector exceeded its configured budget
pub async fn predict_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiErrorResponse> {
    // 1. Pull the image file out of the multipart body
    let mut file_bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("malformed multipart body: {}", e)))?
    {
        if field.file_name().is_some() || field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::InvalidRequest(format!("failed to read upload: {}", e)))?;
            file_bytes = Some(bytes);
            break;
        }
    }
    let bytes = file_bytes.ok_or_else(|| {
        ApiError::InvalidRequest("multipart body must contain one image file field".to_string())
    })?;

    // 2. Decode into pixels; malformed uploads never reach the detector
    let decoded = decode_upload(&bytes).map_err(|e| {
        warn!("Failed to decode upload: {}", e);
        ApiError::Decode(e.to_string())
    })?;
    let (width, height) = (decoded.width, decoded.height);
    debug!(
        "Decoded {:?} image: {}x{}, {} bytes",
        decoded.format, width, height, decoded.size_bytes
    );
    let image = Arc::new(decoded.image);

    // 3. Detect and render, serialized against the shared detector and
    //    bounded by the configured timeout
    let (raw_detections, annotated) = {
        let _inference = state.inference_lock.lock().await;
        let detector = state.detector.clone();
        let img = Arc::clone(&image);
        let task = tokio::task::spawn_blocking(move || {
            let raw = detector.detect(&img)?;
            let annotated = detector.render(&img, &raw);
            Ok::<_, DetectorError>((raw, annotated))
        });

        match tokio::time::timeout(state.config.detect_timeout, task).await {
            Err(_) => {
                warn!(
                    "Detector exceeded {}s budget",
                    state.config.detect_timeout.as_secs()
                );
                return Err(ApiError::DetectorTimeout.into());
            }
            Ok(Err(e)) => {
                warn!("Detector task aborted: {}", e);
                return Err(ApiError::Detector(e.to_string()).into());
            }
            Ok(Ok(Err(e))) => {
                warn!("Detector failed: {}", e);
                return Err(ApiError::Detector(e.to_string()).into());
            }
            Ok(Ok(Ok(result))) => result,
        }
    };

    // 4. Normalize raw boxes into canonical detections
    let detections = normalize_detections(&raw_detections);

    // 5. Compute the bounded quality metrics
    let metrics = compute_metrics(&detections, &image);

    // 6. Encode the annotated rendering for transport
    let image_base64 = encode_png_base64(&annotated).map_err(|e| {
        warn!("Failed to encode annotated image: {}", e);
        ApiError::Encoding(e.to_string())
    })?;

    info!(
        "Analysis complete: {} detections, quality {}, sharpness {}, light {}, details {}",
        metrics.total_detections, metrics.quality, metrics.sharpness, metrics.light, metrics.details
    );

    // 7. Assemble the response
    Ok(Json(PredictResponse {
        detections: detections.iter().map(DetectionDto::from).collect(),
        metrics: MetricsDto::from(metrics),
        image_size: ImageSize {
            w: width,
            h: height,
        },
        image_base64,
    }))
}
