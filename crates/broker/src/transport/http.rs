// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ErrorResponse};
use crate::pairing::history::{HistoryEntry, HISTORY_CAP};
use crate::state::BrokerState;
use crate::transport::auth;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub runner_count: usize,
    pub app_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntry>,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<BrokerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        runner_count: s.engine.registry.runner_count().await,
        app_count: s.engine.registry.app_count().await,
    })
}

/// `GET /api/v1/pairing/history` — newest-first pairing attempts, gated by
/// the same identity-token verification as the app surface.
pub async fn pairing_history(
    State(s): State<Arc<BrokerState>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    if auth::verify_bearer(&headers, &s.config.token_secret).is_err() {
        return error_response(StatusCode::UNAUTHORIZED, ErrorKind::NotAuthenticated)
            .into_response();
    }

    match s.engine.history_recent(query.limit.min(HISTORY_CAP)).await {
        Ok(entries) => Json(HistoryResponse { entries }).into_response(),
        Err(e) => {
            tracing::warn!(err = %e, "history read failed");
            error_response(StatusCode::BAD_GATEWAY, ErrorKind::NetworkError).into_response()
        }
    }
}

fn error_response(status: StatusCode, kind: ErrorKind) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error: kind.to_error_body(kind.message()) }))
}
