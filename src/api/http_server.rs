// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::predict::predict_handler;
use super::ApiError;
use crate::config::NodeConfig;
use crate::detector::ObjectDetector;

/// Shared per-process state handed to every request handler.
///
/// The detector is loaded once at startup and read-only afterwards;
/// `inference_lock` serializes invocations against its accelerator context.
#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<dyn ObjectDetector>,
    pub inference_lock: Arc<tokio::sync::Mutex<()>>,
    pub config: Arc<NodeConfig>,
}

impl AppState {
    pub fn new(detector: Arc<dyn ObjectDetector>, config: NodeConfig) -> Self {
        Self {
            detector,
            inference_lock: Arc::new(tokio::sync::Mutex::new(())),
            config: Arc::new(config),
        }
    }
}

/// Build the application router. Split from [`start_server`] so tests can
/// drive it without binding a socket.
pub fn build_router(state: AppState) -> Router {
    // Multipart framing adds overhead on top of the raw image bytes
    let body_limit = state.config.max_upload_bytes + 64 * 1024;

    Router::new()
        // Analysis endpoint
        .route("/predict/", post(predict_handler))
        // Health check
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::response::Json(json!({
        "status": "ok",
        "model": state.detector.model_name(),
    }))
}

// Error response wrapper
pub struct ApiErrorResponse(pub ApiError);

impl From<ApiError> for ApiErrorResponse {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let error_response = self.0.to_response();

        (status, axum::response::Json(error_response)).into_response()
    }
}
