// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sliding-window rate limiter for failed pairing attempts.
//!
//! Failures land in a per-app sorted set scored by timestamp; the member is
//! a `(timestamp, random)` composite so bursts within one millisecond all
//! count. Five failures inside 60 s trip a 300 s ban. Both windows are
//! store TTLs, so they survive broker restarts and are shared across
//! instances.

use anyhow::Result;
use uuid::Uuid;

use crate::store::{keys, SharedStore};
use crate::time::epoch_ms;

pub const WINDOW_MS: u64 = 60_000;
pub const FAILURE_THRESHOLD: u64 = 5;
pub const BAN_MS: u64 = 300_000;

pub struct RateLimiter {
    store: SharedStore,
}

impl RateLimiter {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Record one failed attempt. Returns true when this failure tripped a
    /// ban.
    pub async fn record_failure(&self, app_id: &str) -> Result<bool> {
        let now = epoch_ms();
        let key = keys::failures(app_id);
        let member = format!("{now}-{}", Uuid::new_v4());
        self.store.zadd(&key, &member, now).await?;
        self.store.zrem_below(&key, now.saturating_sub(WINDOW_MS)).await?;
        self.store.pexpire(&key, WINDOW_MS).await?;
        let failures = self.store.zcard(&key).await?;
        if failures >= FAILURE_THRESHOLD {
            let ban_until = now + BAN_MS;
            self.store.set_px(&keys::ban(app_id), &ban_until.to_string(), BAN_MS).await?;
            tracing::warn!(app_id, failures, "pairing failure threshold reached, banning");
            return Ok(true);
        }
        Ok(false)
    }

    pub async fn is_banned(&self, app_id: &str) -> Result<bool> {
        Ok(self.ban_until(app_id).await?.is_some_and(|until| epoch_ms() < until))
    }

    /// Seconds until an active ban elapses, rounded up; zero when unbanned.
    pub async fn remaining_ban_secs(&self, app_id: &str) -> Result<u64> {
        let now = epoch_ms();
        match self.ban_until(app_id).await? {
            Some(until) if until > now => Ok((until - now).div_ceil(1000)),
            _ => Ok(0),
        }
    }

    /// Clear the failure window. An active ban is left in place.
    pub async fn reset(&self, app_id: &str) -> Result<()> {
        self.store.del(&keys::failures(app_id)).await
    }

    async fn ban_until(&self, app_id: &str) -> Result<Option<u64>> {
        match self.store.get(&keys::ban(app_id)).await? {
            Some(raw) => Ok(raw.parse::<u64>().ok()),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
