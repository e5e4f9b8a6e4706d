// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner liveness tracking via heartbeat timestamps.
//!
//! The stored TTL (60 s) deliberately exceeds the online window (30 s):
//! `is_online` decides from the stored timestamp, not key presence, so a
//! broker that only trusted TTL presence would not falsely report online
//! for the trailing half of the TTL.

use anyhow::Result;

use crate::store::{keys, SharedStore};
use crate::time::epoch_ms;

/// Runners are expected to heartbeat every 10 s.
pub const HEARTBEAT_INTERVAL_MS: u64 = 10_000;
/// Max silence before a runner counts as offline.
pub const ONLINE_WINDOW_MS: u64 = 30_000;
/// Store TTL, 2x the online window.
pub const LIVENESS_TTL_MS: u64 = 60_000;

pub struct LivenessTracker {
    store: SharedStore,
}

impl LivenessTracker {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn on_heartbeat(&self, runner_id: &str) -> Result<()> {
        let now = epoch_ms();
        self.store.set_px(&keys::liveness(runner_id), &now.to_string(), LIVENESS_TTL_MS).await
    }

    pub async fn is_online(&self, runner_id: &str) -> Result<bool> {
        let Some(raw) = self.store.get(&keys::liveness(runner_id)).await? else {
            return Ok(false);
        };
        let Ok(stamp) = raw.parse::<u64>() else {
            return Ok(false);
        };
        Ok(epoch_ms().saturating_sub(stamp) < ONLINE_WINDOW_MS)
    }
}

#[cfg(test)]
#[path = "liveness_tests.rs"]
mod tests;
