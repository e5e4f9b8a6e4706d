// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format message types.
//!
//! All boundary traffic is JSON text frames tagged by an `event` field.
//! Protocol frames deserialize into the typed enums below; terminal-bridge
//! frames (`terminal_input`, `terminal_output`, `terminal_resize`,
//! `session_ended`) are routed from a partial parse and forwarded as raw
//! text so the broker never interprets terminal bytes.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Protocol frames sent by a runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum RunnerRequest {
    /// Only valid before the connection reaches `Advertised`. A supplied
    /// `pairing_code` is registered as-is (the runner regenerates on
    /// `DUPLICATE_CODE`); an omitted one is allocated broker-side.
    #[serde(rename = "runner:register")]
    Register {
        runner_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pairing_code: Option<String>,
        secret: String,
    },
    #[serde(rename = "runner:heartbeat")]
    Heartbeat { runner_id: String },
}

/// Protocol frames sent by an app.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum AppRequest {
    #[serde(rename = "app:pair")]
    Pair { pairing_code: String },
    #[serde(rename = "app:pairing:status")]
    PairingStatus,
    #[serde(rename = "app:unpair")]
    Unpair,
    #[serde(rename = "connect_runner")]
    ConnectRunner { runner_id: String, session_id: String },
}

/// Frames sent by the broker to either peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ServerFrame {
    #[serde(rename = "runner:register:success")]
    RunnerRegisterSuccess { runner_id: String, pairing_code: String },
    #[serde(rename = "runner:register:error")]
    RunnerRegisterError { code: ErrorKind, message: String },
    #[serde(rename = "app:pair:success")]
    AppPairSuccess { runner_id: String, paired_at: u64 },
    #[serde(rename = "app:pair:error")]
    AppPairError {
        code: ErrorKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_ban_seconds: Option<u64>,
    },
    #[serde(rename = "app:pairing:status:response")]
    AppPairingStatus {
        paired: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        runner_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        runner_online: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        paired_at: Option<u64>,
    },
    #[serde(rename = "app:unpair:success")]
    AppUnpairSuccess {
        #[serde(skip_serializing_if = "Option::is_none")]
        runner_id: Option<String>,
    },
    #[serde(rename = "app:unpair:error")]
    AppUnpairError { code: ErrorKind, message: String },
    /// Fan-out on runner reattachment.
    #[serde(rename = "runner:online")]
    RunnerOnline { runner_id: String },
    /// Fan-out on runner disconnect, sent while bindings are torn down.
    #[serde(rename = "runner:offline")]
    RunnerOffline { runner_id: String },
    /// Instruction to the runner to open a pseudo-terminal session.
    #[serde(rename = "connect_runner")]
    ConnectRunner { app_id: String, session_id: String },
    #[serde(rename = "connect_runner:success")]
    ConnectRunnerSuccess { runner_id: String, session_id: String },
    #[serde(rename = "connect_runner:error")]
    ConnectRunnerError { code: ErrorKind, message: String },
    /// Advisory reply to malformed or unknown app frames.
    #[serde(rename = "error")]
    Error { code: ErrorKind, message: String },
}

impl ServerFrame {
    pub fn error(kind: ErrorKind) -> Self {
        Self::Error { code: kind, message: kind.message().to_owned() }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}

/// Lightweight routing info extracted without full deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct RouteInfo<'a> {
    #[serde(default)]
    pub event: Option<&'a str>,
    #[serde(default)]
    pub session_id: Option<&'a str>,
}

/// Extract the `event` and `session_id` fields from a JSON object.
pub fn extract_route_info(json: &str) -> RouteInfo<'_> {
    serde_json::from_str(json).unwrap_or_default()
}

/// Terminal-bridge frames an app may send toward its runner.
pub fn is_app_terminal_event(event: &str) -> bool {
    matches!(event, "terminal_input" | "terminal_resize")
}

/// Terminal-bridge frames a runner may send toward an app.
pub fn is_runner_terminal_event(event: &str) -> bool {
    matches!(event, "terminal_output" | "session_ended")
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
