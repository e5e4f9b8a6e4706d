// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App-side WebSocket handler.
//!
//! The upgrade itself is the authentication handshake: the identity token
//! rides the query string, and a rejected token closes with 401 before any
//! protocol frame flows. After attach, frames from this app are processed
//! in arrival order; everything outbound funnels through the registry
//! channel so the newest attachment for an identity wins delivery.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::ErrorKind;
use crate::registry::Handle;
use crate::state::BrokerState;
use crate::transport::auth;
use crate::transport::messages::{
    extract_route_info, is_app_terminal_event, AppRequest, ServerFrame,
};

#[derive(Debug, Deserialize)]
pub struct AppWsQuery {
    pub token: Option<String>,
}

/// `GET /ws/app` — WebSocket upgrade for an app transport.
pub async fn ws_handler(
    State(state): State<Arc<BrokerState>>,
    Query(query): Query<AppWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let app_id = match query
        .token
        .as_deref()
        .ok_or(ErrorKind::NotAuthenticated)
        .and_then(|token| auth::verify_identity_token(&state.config.token_secret, token))
    {
        Ok(app_id) => app_id,
        Err(_) => {
            return axum::http::Response::builder()
                .status(401)
                .body(axum::body::Body::from("unauthorized"))
                .unwrap_or_default()
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_app(state, app_id, socket)).into_response()
}

/// Per-connection event loop.
async fn handle_app(state: Arc<BrokerState>, app_id: String, socket: WebSocket) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = state.engine.registry.new_handle(tx);
    state.engine.registry.attach_app(&app_id, handle.clone()).await;
    tracing::info!(app_id = %app_id, conn_id = handle.conn_id, "app attached");

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            // Registry-routed frames (responses, fan-out, terminal output).
            frame = rx.recv() => {
                match frame {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text = text.to_string();
                        if let Some(reply) =
                            dispatch(&state, &handle, &app_id, &text).await
                        {
                            if ws_tx.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {} // ping/pong/binary ignored
                }
            }
        }
    }

    state.engine.app_disconnected(handle.conn_id).await;
    tracing::info!(app_id = %app_id, conn_id = handle.conn_id, "app transport closed");
}

/// Route one inbound frame; returns the direct reply, if any.
async fn dispatch(
    state: &BrokerState,
    handle: &Handle,
    app_id: &str,
    text: &str,
) -> Option<String> {
    let info = extract_route_info(text);
    let event = info.event?;

    if is_app_terminal_event(event) {
        let session_id = info.session_id?;
        state.engine.forward_app_terminal(app_id, session_id, text).await;
        return None;
    }

    match serde_json::from_str::<AppRequest>(text) {
        Ok(AppRequest::Pair { pairing_code }) => {
            Some(state.engine.app_pair(app_id, &pairing_code).await.to_json())
        }
        Ok(AppRequest::PairingStatus) => Some(state.engine.app_status(app_id).await.to_json()),
        Ok(AppRequest::Unpair) => Some(state.engine.app_unpair(app_id).await.to_json()),
        Ok(AppRequest::ConnectRunner { runner_id, session_id }) => {
            Some(state.engine.connect_runner(handle, &runner_id, &session_id).await.to_json())
        }
        Err(e) => {
            tracing::debug!(app_id, event, err = %e, "malformed app frame");
            Some(ServerFrame::error(ErrorKind::BadRequest).to_json())
        }
    }
}

#[cfg(test)]
#[path = "ws_app_tests.rs"]
mod tests;
