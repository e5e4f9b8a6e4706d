// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner-side WebSocket handler.
//!
//! Runners authenticate in-band: the first frame must be
//! `runner:register` carrying the shared secret. Connection states:
//! accept -> awaiting register -> advertised -> closed. An invalid secret
//! or an exhausted registration budget closes the socket after the error
//! frame; a duplicate or malformed supplied code keeps it open so the
//! runner can regenerate and retry.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::ErrorKind;
use crate::registry::Handle;
use crate::state::BrokerState;
use crate::transport::messages::{
    extract_route_info, is_runner_terminal_event, RunnerRequest, ServerFrame,
};

/// Connection phase for a runner transport.
enum Phase {
    AwaitRegister,
    Advertised { runner_id: String },
}

/// Outcome of dispatching one inbound frame.
enum Flow {
    Continue,
    Reply(String),
    /// Send the frame, then close the connection.
    Fatal(String),
}

/// `GET /ws/runner` — WebSocket upgrade for a runner transport.
pub async fn ws_handler(
    State(state): State<Arc<BrokerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_runner(state, socket))
}

/// Per-connection event loop.
async fn handle_runner(state: Arc<BrokerState>, socket: WebSocket) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = state.engine.registry.new_handle(tx);
    let mut phase = Phase::AwaitRegister;

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            // Registry-routed frames (terminal open instructions).
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
                        match dispatch(&state, &handle, &mut phase, &text).await {
                            Flow::Continue => {}
                            Flow::Reply(reply) => {
                                if ws_tx.send(Message::Text(reply.into())).await.is_err() {
                                    break;
                                }
                            }
                            Flow::Fatal(reply) => {
                                let _ = ws_tx.send(Message::Text(reply.into())).await;
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

    // Handles the never-registered case too: detach resolves no identity.
    state.engine.runner_disconnected(handle.conn_id).await;
}

async fn dispatch(
    state: &BrokerState,
    handle: &Handle,
    phase: &mut Phase,
    text: &str,
) -> Flow {
    let info = extract_route_info(text);
    let Some(event) = info.event else {
        tracing::debug!("runner frame without event tag ignored");
        return Flow::Continue;
    };

    if is_runner_terminal_event(event) {
        let (Phase::Advertised { runner_id }, Some(session_id)) = (&*phase, info.session_id)
        else {
            return Flow::Continue;
        };
        state.engine.forward_runner_terminal(runner_id, event, session_id, text).await;
        return Flow::Continue;
    }

    match serde_json::from_str::<RunnerRequest>(text) {
        Ok(RunnerRequest::Register { runner_id, pairing_code, secret }) => {
            if let Phase::Advertised { .. } = phase {
                tracing::debug!(runner_id, "duplicate register on advertised connection ignored");
                return Flow::Continue;
            }
            match state
                .engine
                .runner_register(handle, &runner_id, pairing_code.as_deref(), &secret)
                .await
            {
                Ok(code) => {
                    *phase = Phase::Advertised { runner_id: runner_id.clone() };
                    Flow::Reply(
                        ServerFrame::RunnerRegisterSuccess { runner_id, pairing_code: code }
                            .to_json(),
                    )
                }
                Err(kind) => {
                    let reply = ServerFrame::RunnerRegisterError {
                        code: kind,
                        message: kind.message().to_owned(),
                    }
                    .to_json();
                    match kind {
                        ErrorKind::InvalidSecret | ErrorKind::RegistrationExhausted => {
                            Flow::Fatal(reply)
                        }
                        _ => Flow::Reply(reply),
                    }
                }
            }
        }
        Ok(RunnerRequest::Heartbeat { runner_id }) => {
            if let Phase::Advertised { runner_id: registered } = &*phase {
                state.engine.runner_heartbeat(registered, &runner_id).await;
            }
            Flow::Continue
        }
        Err(e) => {
            tracing::debug!(event, err = %e, "malformed runner frame ignored");
            Flow::Continue
        }
    }
}

#[cfg(test)]
#[path = "ws_runner_tests.rs"]
mod tests;
