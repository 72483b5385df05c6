// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::fmt;

use serde::{Deserialize, Serialize};

/// JSON error body; `error_type` distinguishes the failure kind so the
/// caller can tell a bad upload from a detector fault.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
}

/// Request-level failures of the analysis endpoint.
///
/// Decode and request-shape problems are the client's (4xx, not retried);
/// detector and encoding failures are the server's (5xx). A detector
/// timeout is retryable by the caller and maps to 504.
#[derive(Debug, Clone)]
pub enum ApiError {
    InvalidRequest(String),
    Decode(String),
    Detector(String),
    DetectorTimeout,
    Encoding(String),
}

impl ApiError {
    pub fn to_response(&self) -> ErrorResponse {
        let (error_type, message) = match self {
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone()),
            ApiError::Decode(msg) => ("decode_error", msg.clone()),
            ApiError::Detector(msg) => ("detector_error", msg.clone()),
            ApiError::DetectorTimeout => (
                "detector_timeout",
                "Detector did not finish within the configured budget".to_string(),
            ),
            ApiError::Encoding(msg) => ("encoding_error", msg.clone()),
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            message,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidRequest(_) | ApiError::Decode(_) => 400,
            ApiError::Detector(_) => 500,
            ApiError::DetectorTimeout => 504,
            ApiError::Encoding(_) => 500,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::Decode(msg) => write!(f, "Image decode failed: {}", msg),
            ApiError::Detector(msg) => write!(f, "Detector failed: {}", msg),
            ApiError::DetectorTimeout => write!(f, "Detector timed out"),
            ApiError::Encoding(msg) => write!(f, "Encoding failed: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_split_client_and_server_faults() {
        assert_eq!(ApiError::Decode("x".into()).status_code(), 400);
        assert_eq!(ApiError::InvalidRequest("x".into()).status_code(), 400);
        assert_eq!(ApiError::Detector("x".into()).status_code(), 500);
        assert_eq!(ApiError::DetectorTimeout.status_code(), 504);
        assert_eq!(ApiError::Encoding("x".into()).status_code(), 500);
    }

    #[test]
    fn test_error_type_identifies_failure_kind() {
        assert_eq!(
            ApiError::Decode("bad bytes".into()).to_response().error_type,
            "decode_error"
        );
        assert_eq!(
            ApiError::Detector("boom".into()).to_response().error_type,
            "detector_error"
        );
    }

    #[test]
    fn test_error_response_serialization() {
        let body = ApiError::Decode("unsupported image format".into()).to_response();
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"error_type\":\"decode_error\""));
        assert!(json.contains("unsupported image format"));
    }
}
