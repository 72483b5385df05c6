// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::env;
use std::sync::Arc;

use anyhow::Result;
use damage_vision_node::{
    api::{start_server, AppState},
    config::NodeConfig,
    detector::{ObjectDetector, YoloDetector},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("🚀 Starting Damage Vision Node v{}...\n", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::from_env();
    println!("   Model: {}", config.model_path.display());
    println!("   Labels: {}", config.labels_path.display());
    println!("   Device: {:?}", config.device);
    println!("   API port: {}", config.api_port);
    println!();

    // Load the detector once; it is shared read-only across all requests
    let detector = YoloDetector::load(&config)?;
    println!("✅ Detector '{}' ready\n", detector.model_name());

    let port = config.api_port;
    let state = AppState::new(Arc::new(detector), config);

    start_server(state, port).await
}
