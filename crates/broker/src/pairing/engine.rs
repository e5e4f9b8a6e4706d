// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pairing protocol engine.
//!
//! Orchestrates the registry, allocator, session store, rate limiter,
//! liveness tracker, and history recorder to implement the wire protocol.
//! Home of the security invariant: an app that has not paired with a
//! runner can never reach it through the terminal bridge, checked on every
//! `connect_runner` request and never cached on the socket.

use std::collections::HashMap;

use anyhow::Result;

use crate::bridge::BridgeTable;
use crate::error::ErrorKind;
use crate::pairing::allocator::{CodeAllocator, Registration, Validation};
use crate::pairing::history::{HistoryEntry, HistoryRecorder};
use crate::pairing::liveness::LivenessTracker;
use crate::pairing::rate_limit::RateLimiter;
use crate::pairing::session::SessionStore;
use crate::registry::{ConnId, Handle, Identity, Registry};
use crate::store::SharedStore;
use crate::time::epoch_ms;
use crate::transport::messages::ServerFrame;

pub struct Engine {
    pub registry: Registry,
    pub bridge: BridgeTable,
    allocator: CodeAllocator,
    sessions: SessionStore,
    limiter: RateLimiter,
    liveness: LivenessTracker,
    history: HistoryRecorder,
    runner_secrets: HashMap<String, String>,
}

impl Engine {
    pub fn new(store: SharedStore, runner_secrets: HashMap<String, String>) -> Self {
        Self {
            registry: Registry::new(),
            bridge: BridgeTable::new(),
            allocator: CodeAllocator::new(store.clone()),
            sessions: SessionStore::new(store.clone()),
            limiter: RateLimiter::new(store.clone()),
            liveness: LivenessTracker::new(store.clone()),
            history: HistoryRecorder::new(store),
            runner_secrets,
        }
    }

    // -- Runner side ----------------------------------------------------------

    /// Handle `runner:register`. On success the runner is attached, its
    /// liveness is primed, and apps still bound to it are notified that it
    /// came back. Returns the advertised code.
    pub async fn runner_register(
        &self,
        handle: &Handle,
        runner_id: &str,
        pairing_code: Option<&str>,
        secret: &str,
    ) -> Result<String, ErrorKind> {
        let expected = self.runner_secrets.get(runner_id).ok_or_else(|| {
            tracing::warn!(runner_id, "register from unknown runner identity");
            ErrorKind::InvalidSecret
        })?;
        if !crate::transport::auth::constant_time_eq(secret, expected) {
            tracing::warn!(runner_id, "runner secret mismatch");
            return Err(ErrorKind::InvalidSecret);
        }

        let code = self
            .register_code(runner_id, pairing_code)
            .await
            .map_err(|e| self.store_fault("runner register", e))??;

        self.registry.attach_runner(runner_id, handle.clone()).await;
        if let Err(e) = self.liveness.on_heartbeat(runner_id).await {
            tracing::warn!(runner_id, err = %e, "failed to prime runner liveness");
        }

        // Reattachment fan-out: apps bound from a prior epoch learn the
        // runner is reachable again.
        match self.sessions.apps_of(runner_id).await {
            Ok(apps) => {
                let frame =
                    ServerFrame::RunnerOnline { runner_id: runner_id.to_owned() }.to_json();
                for app_id in apps {
                    self.registry.send_to_app(&app_id, frame.clone()).await;
                }
            }
            Err(e) => tracing::warn!(runner_id, err = %e, "runner online fan-out failed"),
        }

        tracing::info!(runner_id, code = %code, "runner advertised");
        Ok(code)
    }

    /// Register the supplied code, or allocate one broker-side.
    async fn register_code(
        &self,
        runner_id: &str,
        supplied: Option<&str>,
    ) -> Result<Result<String, ErrorKind>> {
        if let Some(code) = supplied {
            if !CodeAllocator::is_valid_format(code) {
                return Ok(Err(ErrorKind::InvalidFormat));
            }
        }

        // A runner re-registering replaces its previous code, but only once
        // the new one is safely in place: a failed attempt must leave the
        // old code advertised and valid.
        let stale = self.allocator.code_of(runner_id).await?;

        let registered = match supplied {
            Some(code) => match self.allocator.register(code, runner_id).await? {
                Registration::Registered => code.to_owned(),
                Registration::Duplicate => return Ok(Err(ErrorKind::DuplicateCode)),
            },
            None => match self.allocator.register_with_retry(runner_id).await? {
                Some(code) => code,
                None => return Ok(Err(ErrorKind::RegistrationExhausted)),
            },
        };

        // The reverse index already points at the new code; invalidate only
        // sweeps the superseded entry.
        if let Some(stale) = stale {
            if stale != registered {
                self.allocator.invalidate(&stale).await?;
            }
        }

        Ok(Ok(registered))
    }

    /// Handle `runner:heartbeat`. Fire-and-forget; the socket's registered
    /// identity is authoritative, a mismatched id in the payload is ignored.
    pub async fn runner_heartbeat(&self, registered_id: &str, claimed_id: &str) {
        if registered_id != claimed_id {
            tracing::debug!(registered_id, claimed_id, "heartbeat identity mismatch, ignoring");
            return;
        }
        if let Err(e) = self.liveness.on_heartbeat(registered_id).await {
            tracing::warn!(runner_id = registered_id, err = %e, "heartbeat write failed");
        }
    }

    /// Transport-loss teardown: invalidate the advertised code, purge every
    /// binding, and tell each bound app the runner went away. A superseded
    /// connection resolves to no identity and tears nothing down.
    pub async fn runner_disconnected(&self, conn_id: ConnId) {
        let Some(Identity::Runner(runner_id)) = self.registry.detach(conn_id).await else {
            return;
        };

        match self.allocator.code_of(&runner_id).await {
            Ok(Some(code)) => {
                if let Err(e) = self.allocator.invalidate(&code).await {
                    tracing::warn!(runner_id, err = %e, "code invalidation failed");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(runner_id, err = %e, "code lookup failed on disconnect"),
        }

        match self.sessions.remove_all_for(&runner_id).await {
            Ok(apps) => {
                let frame =
                    ServerFrame::RunnerOffline { runner_id: runner_id.clone() }.to_json();
                for app_id in apps {
                    // Detached apps miss this and learn on reconnect via
                    // app:pairing:status.
                    self.registry.send_to_app(&app_id, frame.clone()).await;
                }
            }
            Err(e) => tracing::warn!(runner_id, err = %e, "binding teardown failed"),
        }

        self.bridge.remove_for_runner(&runner_id).await;
        tracing::info!(runner_id, "runner disconnected");
    }

    // -- App side -------------------------------------------------------------

    /// Handle `app:pair` and return the response frame.
    pub async fn app_pair(&self, app_id: &str, code: &str) -> ServerFrame {
        // Ban check first; a banned attempt is not a fresh failure.
        match self.limiter.is_banned(app_id).await {
            Ok(true) => {
                let remaining = self.limiter.remaining_ban_secs(app_id).await.unwrap_or(0);
                tracing::warn!(app_id, remaining, "pair attempt while banned");
                self.record_attempt(app_id, None, code, false, Some(ErrorKind::RateLimited))
                    .await;
                return ServerFrame::AppPairError {
                    code: ErrorKind::RateLimited,
                    message: ErrorKind::RateLimited.message().to_owned(),
                    remaining_ban_seconds: Some(remaining),
                };
            }
            Ok(false) => {}
            Err(e) => return self.pair_store_fault(app_id, code, e).await,
        }

        if !CodeAllocator::is_valid_format(code) {
            return self.pair_failure(app_id, None, code, ErrorKind::InvalidFormat).await;
        }

        let runner_id = match self.allocator.validate(code).await {
            Ok(Validation::Ok { runner_id }) => runner_id,
            Ok(Validation::NotFound) => {
                return self.pair_failure(app_id, None, code, ErrorKind::CodeNotFound).await;
            }
            Ok(Validation::Expired) => {
                return self.pair_failure(app_id, None, code, ErrorKind::CodeExpired).await;
            }
            Err(e) => return self.pair_store_fault(app_id, code, e).await,
        };

        match self.liveness.is_online(&runner_id).await {
            Ok(true) => {}
            Ok(false) => {
                return self
                    .pair_failure(app_id, Some(&runner_id), code, ErrorKind::RunnerOffline)
                    .await;
            }
            Err(e) => return self.pair_store_fault(app_id, code, e).await,
        }

        // Commit. A runner vanishing between the checks and here leaves a
        // binding that self-corrects at the bridge gate and status queries.
        let binding = match self.sessions.create(app_id, &runner_id).await {
            Ok(binding) => binding,
            Err(e) => return self.pair_store_fault(app_id, code, e).await,
        };
        if let Err(e) = self.allocator.mark_used(code).await {
            tracing::warn!(app_id, code, err = %e, "mark_used failed");
        }
        self.record_attempt(app_id, Some(&runner_id), code, true, None).await;
        if let Err(e) = self.limiter.reset(app_id).await {
            tracing::warn!(app_id, err = %e, "rate-limit reset failed");
        }

        tracing::info!(app_id, runner_id = %runner_id, "app paired");
        ServerFrame::AppPairSuccess { runner_id, paired_at: binding.paired_at }
    }

    /// Handle `app:pairing:status`.
    pub async fn app_status(&self, app_id: &str) -> ServerFrame {
        match self.sessions.get(app_id).await {
            Ok(Some(binding)) => {
                let runner_online =
                    self.liveness.is_online(&binding.runner_id).await.unwrap_or(false);
                ServerFrame::AppPairingStatus {
                    paired: true,
                    runner_id: Some(binding.runner_id),
                    runner_online: Some(runner_online),
                    paired_at: Some(binding.paired_at),
                }
            }
            Ok(None) => ServerFrame::AppPairingStatus {
                paired: false,
                runner_id: None,
                runner_online: None,
                paired_at: None,
            },
            Err(e) => {
                tracing::warn!(app_id, err = %e, "status lookup failed");
                ServerFrame::error(ErrorKind::NetworkError)
            }
        }
    }

    /// Handle `app:unpair`. The runner's code stays valid; other apps may
    /// remain paired.
    pub async fn app_unpair(&self, app_id: &str) -> ServerFrame {
        match self.sessions.remove(app_id).await {
            Ok(runner_id) => {
                tracing::info!(app_id, runner_id = ?runner_id, "app unpaired");
                ServerFrame::AppUnpairSuccess { runner_id }
            }
            Err(e) => {
                tracing::warn!(app_id, err = %e, "unpair failed");
                ServerFrame::AppUnpairError {
                    code: ErrorKind::NetworkError,
                    message: ErrorKind::NetworkError.message().to_owned(),
                }
            }
        }
    }

    /// Preserve the binding; only the handle mapping goes.
    pub async fn app_disconnected(&self, conn_id: ConnId) {
        self.registry.detach(conn_id).await;
    }

    // -- Terminal bridge ------------------------------------------------------

    /// Gate and dispatch `connect_runner`. Both conditions are evaluated on
    /// every request: the calling transport must currently be attached to a
    /// known app identity, and that identity must hold a binding to exactly
    /// this runner.
    pub async fn connect_runner(
        &self,
        handle: &Handle,
        runner_id: &str,
        session_id: &str,
    ) -> ServerFrame {
        let app_id = match self.registry.identity_of(handle.conn_id).await {
            Some(Identity::App(app_id)) => app_id,
            _ => {
                tracing::warn!(runner_id, session_id, "connect_runner on unauthenticated transport");
                return ServerFrame::ConnectRunnerError {
                    code: ErrorKind::NotAuthenticated,
                    message: ErrorKind::NotAuthenticated.message().to_owned(),
                };
            }
        };

        match self.sessions.is_paired_with(&app_id, runner_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(app_id, runner_id, "connect_runner without pairing");
                return ServerFrame::ConnectRunnerError {
                    code: ErrorKind::NotPaired,
                    message: ErrorKind::NotPaired.message().to_owned(),
                };
            }
            Err(e) => {
                tracing::warn!(app_id, runner_id, err = %e, "pairing gate lookup failed");
                return ServerFrame::ConnectRunnerError {
                    code: ErrorKind::NetworkError,
                    message: ErrorKind::NetworkError.message().to_owned(),
                };
            }
        }

        self.bridge.insert(session_id, &app_id, runner_id).await;
        let instruction = ServerFrame::ConnectRunner {
            app_id: app_id.clone(),
            session_id: session_id.to_owned(),
        };
        self.registry.send_to_runner(runner_id, instruction.to_json()).await;

        tracing::info!(app_id, runner_id, session_id, "terminal session opened");
        ServerFrame::ConnectRunnerSuccess {
            runner_id: runner_id.to_owned(),
            session_id: session_id.to_owned(),
        }
    }

    /// Forward an app's terminal frame to the runner behind the session.
    /// The session must belong to the sending app.
    pub async fn forward_app_terminal(&self, app_id: &str, session_id: &str, raw: &str) {
        match self.bridge.get(session_id).await {
            Some(session) if session.app_id == app_id => {
                self.registry.send_to_runner(&session.runner_id, raw.to_owned()).await;
            }
            _ => {
                tracing::debug!(app_id, session_id, "terminal frame for unknown session dropped");
            }
        }
    }

    /// Forward a runner's terminal frame to the app behind the session.
    /// `session_ended` also closes the session entry.
    pub async fn forward_runner_terminal(
        &self,
        runner_id: &str,
        event: &str,
        session_id: &str,
        raw: &str,
    ) {
        match self.bridge.get(session_id).await {
            Some(session) if session.runner_id == runner_id => {
                self.registry.send_to_app(&session.app_id, raw.to_owned()).await;
                if event == "session_ended" {
                    self.bridge.remove(session_id).await;
                }
            }
            _ => {
                tracing::debug!(runner_id, session_id, "terminal frame for unknown session dropped");
            }
        }
    }

    // -- History --------------------------------------------------------------

    pub async fn history_recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.history.recent(limit).await
    }

    // -- Internals ------------------------------------------------------------

    /// Count a failed attempt, record it, and build the error frame.
    async fn pair_failure(
        &self,
        app_id: &str,
        runner_id: Option<&str>,
        code: &str,
        kind: ErrorKind,
    ) -> ServerFrame {
        if let Err(e) = self.limiter.record_failure(app_id).await {
            tracing::warn!(app_id, err = %e, "failure counter write failed");
        }
        self.record_attempt(app_id, runner_id, code, false, Some(kind)).await;
        ServerFrame::AppPairError {
            code: kind,
            message: kind.message().to_owned(),
            remaining_ban_seconds: None,
        }
    }

    /// Store fault during pairing: surface NETWORK_ERROR, no counter bump.
    async fn pair_store_fault(
        &self,
        app_id: &str,
        code: &str,
        err: anyhow::Error,
    ) -> ServerFrame {
        tracing::warn!(app_id, err = %err, "store fault during pairing");
        self.record_attempt(app_id, None, code, false, Some(ErrorKind::NetworkError)).await;
        ServerFrame::AppPairError {
            code: ErrorKind::NetworkError,
            message: ErrorKind::NetworkError.message().to_owned(),
            remaining_ban_seconds: None,
        }
    }

    fn store_fault(&self, context: &str, err: anyhow::Error) -> ErrorKind {
        tracing::warn!(context, err = %err, "store fault");
        ErrorKind::NetworkError
    }

    async fn record_attempt(
        &self,
        app_id: &str,
        runner_id: Option<&str>,
        code: &str,
        success: bool,
        error_kind: Option<ErrorKind>,
    ) {
        self.history
            .record(HistoryEntry {
                timestamp: epoch_ms(),
                app_id: app_id.to_owned(),
                runner_id: runner_id.map(str::to_owned),
                code: code.to_owned(),
                success,
                error_kind: error_kind.map(|k| k.as_str().to_owned()),
            })
            .await;
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
