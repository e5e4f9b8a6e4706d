// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the broker.

pub mod auth;
pub mod http;
pub mod messages;
pub mod ws_app;
pub mod ws_runner;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::config::BrokerConfig;
use crate::state::BrokerState;

/// Build the axum `Router` with all broker routes.
pub fn build_router(state: Arc<BrokerState>) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Pairing attempt history
        .route("/api/v1/pairing/history", get(http::pairing_history))
        // Peer transports
        .route("/ws/runner", get(ws_runner::ws_handler))
        .route("/ws/app", get(ws_app::ws_handler))
        .layer(cors)
        .with_state(state)
}

/// Exact-origin allow-list when configured; permissive otherwise.
fn cors_layer(config: &BrokerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> =
        config.cors_origins.iter().filter_map(|origin| origin.parse().ok()).collect();
    CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
}
