// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal-bridge session table.
//!
//! Once a `connect_runner` request passes the pairing gate, the session id
//! maps to the (app, runner) identity pair. Terminal frames are forwarded
//! by looking the session up and resolving the peer's *current* handle
//! through the registry on every frame — handles are never captured.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// An open terminal session between an app and a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSession {
    pub app_id: String,
    pub runner_id: String,
}

#[derive(Default)]
pub struct BridgeTable {
    sessions: RwLock<HashMap<String, BridgeSession>>,
}

impl BridgeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session_id: &str, app_id: &str, runner_id: &str) {
        self.sessions.write().await.insert(
            session_id.to_owned(),
            BridgeSession { app_id: app_id.to_owned(), runner_id: runner_id.to_owned() },
        );
    }

    pub async fn get(&self, session_id: &str) -> Option<BridgeSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) -> Option<BridgeSession> {
        self.sessions.write().await.remove(session_id)
    }

    /// Drop every session attached to a departing runner.
    pub async fn remove_for_runner(&self, runner_id: &str) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let ids: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.runner_id == runner_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            sessions.remove(id);
        }
        ids
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
