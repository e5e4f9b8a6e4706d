// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process store backend.
//!
//! Implements the same semantics as the Redis backend over a mutexed map
//! with lazy TTL expiry. Backs the test suite and single-node dev mode
//! (`--store memory`); cross-instance consistency obviously does not hold.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::time::epoch_ms;

use super::Store;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    /// member -> score
    ZSet(BTreeMap<String, u64>),
    Set(HashSet<String>),
    /// front = newest
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at_ms: Option<u64>,
}

#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.map.lock().map_err(|_| anyhow!("memory store mutex poisoned"))
    }
}

/// Drop the entry if its TTL has elapsed, mirroring Redis lazy expiry.
fn purge_expired(map: &mut HashMap<String, Entry>, key: &str, now: u64) {
    if let Some(entry) = map.get(key) {
        if entry.expires_at_ms.is_some_and(|at| now >= at) {
            map.remove(key);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut map = self.locked()?;
        purge_expired(&mut map, key, epoch_ms());
        match map.get(key) {
            Some(Entry { value: Value::Str(s), .. }) => Ok(Some(s.clone())),
            Some(_) => Err(anyhow!("wrong type for key {key}")),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.locked()?;
        map.insert(
            key.to_owned(),
            Entry { value: Value::Str(value.to_owned()), expires_at_ms: None },
        );
        Ok(())
    }

    async fn set_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<()> {
        let mut map = self.locked()?;
        map.insert(
            key.to_owned(),
            Entry {
                value: Value::Str(value.to_owned()),
                expires_at_ms: Some(epoch_ms() + ttl_ms),
            },
        );
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool> {
        let mut map = self.locked()?;
        let now = epoch_ms();
        purge_expired(&mut map, key, now);
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(
            key.to_owned(),
            Entry { value: Value::Str(value.to_owned()), expires_at_ms: Some(now + ttl_ms) },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.locked()?.remove(key);
        Ok(())
    }

    async fn persist(&self, key: &str) -> Result<bool> {
        let mut map = self.locked()?;
        purge_expired(&mut map, key, epoch_ms());
        match map.get_mut(key) {
            Some(entry) if entry.expires_at_ms.is_some() => {
                entry.expires_at_ms = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pexpire(&self, key: &str, ttl_ms: u64) -> Result<()> {
        let mut map = self.locked()?;
        let now = epoch_ms();
        purge_expired(&mut map, key, now);
        if let Some(entry) = map.get_mut(key) {
            entry.expires_at_ms = Some(now + ttl_ms);
        }
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: u64) -> Result<()> {
        let mut map = self.locked()?;
        let now = epoch_ms();
        purge_expired(&mut map, key, now);
        let entry = map
            .entry(key.to_owned())
            .or_insert_with(|| Entry { value: Value::ZSet(BTreeMap::new()), expires_at_ms: None });
        match &mut entry.value {
            Value::ZSet(members) => {
                members.insert(member.to_owned(), score);
                Ok(())
            }
            _ => Err(anyhow!("wrong type for key {key}")),
        }
    }

    async fn zrem_below(&self, key: &str, threshold: u64) -> Result<()> {
        let mut map = self.locked()?;
        purge_expired(&mut map, key, epoch_ms());
        if let Some(Entry { value: Value::ZSet(members), .. }) = map.get_mut(key) {
            members.retain(|_, score| *score >= threshold);
            if members.is_empty() {
                map.remove(key);
            }
        }
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut map = self.locked()?;
        purge_expired(&mut map, key, epoch_ms());
        match map.get(key) {
            Some(Entry { value: Value::ZSet(members), .. }) => Ok(members.len() as u64),
            Some(_) => Err(anyhow!("wrong type for key {key}")),
            None => Ok(0),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut map = self.locked()?;
        purge_expired(&mut map, key, epoch_ms());
        let entry = map
            .entry(key.to_owned())
            .or_insert_with(|| Entry { value: Value::Set(HashSet::new()), expires_at_ms: None });
        match &mut entry.value {
            Value::Set(members) => {
                members.insert(member.to_owned());
                Ok(())
            }
            _ => Err(anyhow!("wrong type for key {key}")),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut map = self.locked()?;
        purge_expired(&mut map, key, epoch_ms());
        if let Some(Entry { value: Value::Set(members), .. }) = map.get_mut(key) {
            members.remove(member);
            if members.is_empty() {
                map.remove(key);
            }
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut map = self.locked()?;
        purge_expired(&mut map, key, epoch_ms());
        match map.get(key) {
            Some(Entry { value: Value::Set(members), .. }) => {
                Ok(members.iter().cloned().collect())
            }
            Some(_) => Err(anyhow!("wrong type for key {key}")),
            None => Ok(Vec::new()),
        }
    }

    async fn lpush_ltrim(&self, key: &str, value: &str, cap: usize) -> Result<()> {
        let mut map = self.locked()?;
        let entry = map
            .entry(key.to_owned())
            .or_insert_with(|| Entry { value: Value::List(VecDeque::new()), expires_at_ms: None });
        match &mut entry.value {
            Value::List(items) => {
                items.push_front(value.to_owned());
                items.truncate(cap);
                Ok(())
            }
            _ => Err(anyhow!("wrong type for key {key}")),
        }
    }

    async fn lrange(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        let map = self.locked()?;
        match map.get(key) {
            Some(Entry { value: Value::List(items), .. }) => {
                Ok(items.iter().take(limit).cloned().collect())
            }
            Some(_) => Err(anyhow!("wrong type for key {key}")),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
