// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared key-value store abstraction.
//!
//! The store is the only mutable state shared across broker instances;
//! everything cross-connection (codes, bindings, liveness, rate limits,
//! history) lives here so that concurrent brokers stay consistent and
//! TTL-driven lifecycles survive broker restarts. The primitive set is
//! deliberately the Redis command vocabulary: conditional set, TTL,
//! sorted sets, sets, and capped lists.

pub mod memory;
pub mod redis;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Shared handle to a store backend.
pub type SharedStore = Arc<dyn Store>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a string value, clearing any TTL on the key.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Set a string value with a TTL in milliseconds.
    async fn set_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<()>;

    /// Atomic set-iff-absent with a TTL. Returns false if the key exists.
    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool>;

    /// Delete a key. Deleting an absent key is a no-op.
    async fn del(&self, key: &str) -> Result<()>;

    /// Remove the TTL from a key. Returns false if the key is absent or
    /// carries no TTL.
    async fn persist(&self, key: &str) -> Result<bool>;

    /// (Re)set a TTL on an existing key.
    async fn pexpire(&self, key: &str, ttl_ms: u64) -> Result<()>;

    async fn zadd(&self, key: &str, member: &str, score: u64) -> Result<()>;

    /// Remove all sorted-set members with score strictly below `threshold`.
    async fn zrem_below(&self, key: &str, threshold: u64) -> Result<()>;

    async fn zcard(&self, key: &str) -> Result<u64>;

    async fn sadd(&self, key: &str, member: &str) -> Result<()>;

    async fn srem(&self, key: &str, member: &str) -> Result<()>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Atomic push-then-trim: prepend `value` and keep the newest `cap`
    /// entries.
    async fn lpush_ltrim(&self, key: &str, value: &str, cap: usize) -> Result<()>;

    /// Read up to `limit` entries, newest first.
    async fn lrange(&self, key: &str, limit: usize) -> Result<Vec<String>>;
}

/// Key layout for the pairing subsystem.
pub mod keys {
    pub fn code(code: &str) -> String {
        format!("pair:code:{code}")
    }

    pub fn runner_code(runner_id: &str) -> String {
        format!("pair:runner:{runner_id}")
    }

    pub fn binding(app_id: &str) -> String {
        format!("pair:binding:{app_id}")
    }

    pub fn fanout(runner_id: &str) -> String {
        format!("pair:fanout:{runner_id}")
    }

    pub fn liveness(runner_id: &str) -> String {
        format!("pair:live:{runner_id}")
    }

    pub fn failures(app_id: &str) -> String {
        format!("pair:fail:{app_id}")
    }

    pub fn ban(app_id: &str) -> String {
        format!("pair:ban:{app_id}")
    }

    pub fn history() -> String {
        "pair:history".to_owned()
    }
}
