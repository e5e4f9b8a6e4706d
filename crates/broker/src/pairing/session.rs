// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pairing session store: persisted app-runner bindings and the per-runner
//! fan-out sets.
//!
//! Bindings are keyed by App *stable identity*, never by socket id, so they
//! survive transport churn on both sides. `is_paired_with` is the security
//! gate consumed by the terminal bridge.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::store::{keys, SharedStore};
use crate::time::epoch_ms;

/// The persisted fact that an app identity is paired with a runner identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub runner_id: String,
    pub paired_at: u64,
}

pub struct SessionStore {
    store: SharedStore,
}

impl SessionStore {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Bind an app to a runner and add it to the runner's fan-out set.
    /// Re-pairing replaces the binding and migrates fan-out membership.
    pub async fn create(&self, app_id: &str, runner_id: &str) -> Result<Binding> {
        if let Some(prev) = self.get(app_id).await? {
            if prev.runner_id != runner_id {
                self.store.srem(&keys::fanout(&prev.runner_id), app_id).await?;
            }
        }
        let binding = Binding { runner_id: runner_id.to_owned(), paired_at: epoch_ms() };
        self.store.set(&keys::binding(app_id), &serde_json::to_string(&binding)?).await?;
        self.store.sadd(&keys::fanout(runner_id), app_id).await?;
        Ok(binding)
    }

    pub async fn get(&self, app_id: &str) -> Result<Option<Binding>> {
        match self.store.get(&keys::binding(app_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Remove an app's binding and its fan-out membership. Idempotent.
    /// Returns the runner id the app was bound to, if any.
    pub async fn remove(&self, app_id: &str) -> Result<Option<String>> {
        let Some(binding) = self.get(app_id).await? else {
            return Ok(None);
        };
        self.store.del(&keys::binding(app_id)).await?;
        self.store.srem(&keys::fanout(&binding.runner_id), app_id).await?;
        Ok(Some(binding.runner_id))
    }

    /// All app identities currently bound to a runner.
    pub async fn apps_of(&self, runner_id: &str) -> Result<Vec<String>> {
        self.store.smembers(&keys::fanout(runner_id)).await
    }

    /// Fan-out teardown: remove every binding to `runner_id` and return the
    /// set that was removed so the protocol can notify each app.
    pub async fn remove_all_for(&self, runner_id: &str) -> Result<Vec<String>> {
        let apps = self.apps_of(runner_id).await?;
        for app_id in &apps {
            self.store.del(&keys::binding(app_id)).await?;
        }
        self.store.del(&keys::fanout(runner_id)).await?;
        Ok(apps)
    }

    /// The security gate: true iff `app_id` currently holds a binding to
    /// exactly `runner_id`.
    pub async fn is_paired_with(&self, app_id: &str, runner_id: &str) -> Result<bool> {
        Ok(self.get(app_id).await?.is_some_and(|b| b.runner_id == runner_id))
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
