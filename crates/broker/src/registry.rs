// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process connection registry.
//!
//! Maps stable client identities (runner ids, app ids) to their currently
//! attached transport handle. Reattachment supersedes the prior handle
//! atomically; components always route by identity through the registry
//! and never capture handles, so the newest attachment wins delivery.
//! The registry owns no persistent state — on broker restart it is rebuilt
//! from new connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::RwLock;

/// Transient identifier for one transport attachment. Not an identity.
pub type ConnId = u64;

/// The currently-attached outbound channel for a peer. Frames are
/// serialized wire messages; a send to a closed channel is a silent drop.
#[derive(Debug, Clone)]
pub struct Handle {
    pub conn_id: ConnId,
    tx: mpsc::UnboundedSender<String>,
}

impl Handle {
    pub fn send(&self, frame: String) {
        // Receiver gone means the socket task exited; the peer will
        // re-query state on reconnect.
        let _ = self.tx.send(frame);
    }
}

/// A stable identity attached to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Runner(String),
    App(String),
}

#[derive(Default)]
struct Inner {
    runners: HashMap<String, Handle>,
    apps: HashMap<String, Handle>,
    by_conn: HashMap<ConnId, Identity>,
}

#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
    next_conn_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a handle for a freshly accepted transport.
    pub fn new_handle(&self, tx: mpsc::UnboundedSender<String>) -> Handle {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1;
        Handle { conn_id, tx }
    }

    /// Attach a runner, superseding any prior handle for that identity.
    pub async fn attach_runner(&self, runner_id: &str, handle: Handle) {
        let mut inner = self.inner.write().await;
        let identity = Identity::Runner(runner_id.to_owned());
        if let Some(prev) = inner.runners.insert(runner_id.to_owned(), handle.clone()) {
            inner.by_conn.remove(&prev.conn_id);
        }
        inner.by_conn.insert(handle.conn_id, identity);
    }

    /// Attach an app, superseding any prior handle for that identity.
    /// Session takeover: other components reroute through identity lookup,
    /// so the superseded socket stops receiving immediately.
    pub async fn attach_app(&self, app_id: &str, handle: Handle) {
        let mut inner = self.inner.write().await;
        let identity = Identity::App(app_id.to_owned());
        if let Some(prev) = inner.apps.insert(app_id.to_owned(), handle.clone()) {
            inner.by_conn.remove(&prev.conn_id);
        }
        inner.by_conn.insert(handle.conn_id, identity);
    }

    /// Resolve the identity currently attached on a connection, if any.
    /// Superseded and detached connections resolve to none.
    pub async fn identity_of(&self, conn_id: ConnId) -> Option<Identity> {
        self.inner.read().await.by_conn.get(&conn_id).cloned()
    }

    pub async fn runner_handle(&self, runner_id: &str) -> Option<Handle> {
        self.inner.read().await.runners.get(runner_id).cloned()
    }

    pub async fn app_handle(&self, app_id: &str) -> Option<Handle> {
        self.inner.read().await.apps.get(app_id).cloned()
    }

    /// Send to a runner by identity. Silent drop when detached.
    pub async fn send_to_runner(&self, runner_id: &str, frame: String) {
        if let Some(handle) = self.runner_handle(runner_id).await {
            handle.send(frame);
        }
    }

    /// Send to an app by identity. Silent drop when detached.
    pub async fn send_to_app(&self, app_id: &str, frame: String) {
        if let Some(handle) = self.app_handle(app_id).await {
            handle.send(frame);
        }
    }

    /// Invoked by the transport layer on disconnect. Returns the identity
    /// that was attached on this connection, or none if the connection was
    /// already superseded by a newer attachment.
    pub async fn detach(&self, conn_id: ConnId) -> Option<Identity> {
        let mut inner = self.inner.write().await;
        let identity = inner.by_conn.remove(&conn_id)?;
        match &identity {
            Identity::Runner(id) => {
                if inner.runners.get(id).is_some_and(|h| h.conn_id == conn_id) {
                    inner.runners.remove(id);
                }
            }
            Identity::App(id) => {
                if inner.apps.get(id).is_some_and(|h| h.conn_id == conn_id) {
                    inner.apps.remove(id);
                }
            }
        }
        Some(identity)
    }

    pub async fn runner_count(&self) -> usize {
        self.inner.read().await.runners.len()
    }

    pub async fn app_count(&self) -> usize {
        self.inner.read().await.apps.len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
