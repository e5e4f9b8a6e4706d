// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis store backend.
//!
//! Maps each trait primitive to a single Redis command (or one MULTI/EXEC
//! pipeline for push-then-trim), so atomicity guarantees come from Redis
//! itself and hold across concurrent broker instances. Uniqueness of
//! pairing codes rides on `SET NX`; read-then-write would not survive two
//! brokers sharing the store.

use anyhow::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::Store;

pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect with automatic reconnection handling.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.pset_ex(key, value, ttl_ms).await?;
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool> {
        let mut conn = self.conn();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn persist(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn();
        let changed: bool = conn.persist(key).await?;
        Ok(changed)
    }

    async fn pexpire(&self, key: &str, ttl_ms: u64) -> Result<()> {
        let mut conn = self.conn();
        let _: bool = conn.pexpire(key, ttl_ms as i64).await?;
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: u64) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zrem_below(&self, key: &str, threshold: u64) -> Result<()> {
        let mut conn = self.conn();
        let _: u64 = conn.zrembyscore(key, "-inf", format!("({threshold}")).await?;
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn();
        let count: u64 = conn.zcard(key).await?;
        Ok(count)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.srem(key, member).await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn lpush_ltrim(&self, key: &str, value: &str, cap: usize) -> Result<()> {
        let mut conn = self.conn();
        let _: () = redis::pipe()
            .atomic()
            .lpush(key, value)
            .ignore()
            .ltrim(key, 0, cap as isize - 1)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let items: Vec<String> = conn.lrange(key, 0, limit as isize - 1).await?;
        Ok(items)
    }
}
