// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pairing-code allocator.
//!
//! Codes are 9 characters from a 36-symbol alphabet, displayed grouped as
//! `XXX-XXX-XXX`. Generation uses the system CSPRNG; uniqueness is never
//! assumed from randomness — it is enforced by the store's atomic
//! set-iff-absent at registration, which also holds across concurrent
//! broker instances.

use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::store::{keys, SharedStore};
use crate::time::epoch_ms;

/// Unused codes expire after 24 hours; first use removes the TTL.
pub const CODE_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// The store TTL trails the logical deadline by this much, so `validate`
/// decides expiry from `expires_at` and the TTL is only a backstop.
const TTL_GRACE_MS: u64 = 60_000;

/// Registration retry budget for broker-generated codes.
pub const REGISTER_ATTEMPTS: u32 = 3;

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // pattern is a literal
    Regex::new("^[A-Z0-9]{3}-[A-Z0-9]{3}-[A-Z0-9]{3}$").unwrap()
});

/// Authoritative record in the shared store, keyed by code value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEntry {
    pub runner_id: String,
    pub created_at: u64,
    pub expires_at: u64,
    pub used_count: u64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Registered,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Ok { runner_id: String },
    NotFound,
    Expired,
}

pub struct CodeAllocator {
    store: SharedStore,
    rng: SystemRandom,
}

impl CodeAllocator {
    pub fn new(store: SharedStore) -> Self {
        Self { store, rng: SystemRandom::new() }
    }

    /// True iff `code` is a well-formed wire pairing code (uppercase,
    /// grouped `XXX-XXX-XXX`).
    pub fn is_valid_format(code: &str) -> bool {
        CODE_RE.is_match(code)
    }

    /// Draw a fresh code from the CSPRNG. Modular reduction 256 -> 36 has
    /// negligible bias for this use.
    pub fn generate(&self) -> Result<String> {
        let mut raw = [0u8; 9];
        self.rng.fill(&mut raw).map_err(|_| anyhow!("system rng failure"))?;
        let symbols: Vec<u8> =
            raw.iter().map(|b| ALPHABET[(*b as usize) % ALPHABET.len()]).collect();
        let code = format!(
            "{}-{}-{}",
            String::from_utf8_lossy(&symbols[0..3]),
            String::from_utf8_lossy(&symbols[3..6]),
            String::from_utf8_lossy(&symbols[6..9]),
        );
        Ok(code)
    }

    /// Atomically register `code` for `runner_id`. On success the entry
    /// carries a 24 h TTL and the reverse index is written alongside.
    pub async fn register(&self, code: &str, runner_id: &str) -> Result<Registration> {
        let now = epoch_ms();
        let entry = CodeEntry {
            runner_id: runner_id.to_owned(),
            created_at: now,
            expires_at: now + CODE_TTL_MS,
            used_count: 0,
            is_active: true,
        };
        let json = serde_json::to_string(&entry)?;
        if !self.store.set_nx_px(&keys::code(code), &json, CODE_TTL_MS + TTL_GRACE_MS).await? {
            return Ok(Registration::Duplicate);
        }
        self.store
            .set_px(&keys::runner_code(runner_id), code, CODE_TTL_MS + TTL_GRACE_MS)
            .await?;
        Ok(Registration::Registered)
    }

    /// Generate-and-register loop for broker-allocated codes. Returns the
    /// registered code, or none once the retry budget is exhausted.
    pub async fn register_with_retry(&self, runner_id: &str) -> Result<Option<String>> {
        for attempt in 1..=REGISTER_ATTEMPTS {
            let code = self.generate()?;
            match self.register(&code, runner_id).await? {
                Registration::Registered => return Ok(Some(code)),
                Registration::Duplicate => {
                    tracing::warn!(runner_id, attempt, "pairing code collision, regenerating");
                }
            }
        }
        Ok(None)
    }

    /// Look up a code. Unused codes past their deadline are swept here as
    /// a side effect (the store TTL would collect them eventually anyway);
    /// used codes are never declared expired.
    pub async fn validate(&self, code: &str) -> Result<Validation> {
        let Some(json) = self.store.get(&keys::code(code)).await? else {
            return Ok(Validation::NotFound);
        };
        let entry: CodeEntry = serde_json::from_str(&json)?;
        if !entry.is_active {
            return Ok(Validation::NotFound);
        }
        if entry.used_count == 0 && epoch_ms() > entry.expires_at {
            // Concurrent sweeps race benignly: delete-of-absent is a no-op.
            self.store.del(&keys::code(code)).await?;
            if self.code_of(&entry.runner_id).await?.as_deref() == Some(code) {
                self.store.del(&keys::runner_code(&entry.runner_id)).await?;
            }
            return Ok(Validation::Expired);
        }
        Ok(Validation::Ok { runner_id: entry.runner_id })
    }

    /// Increment the use counter. The 0 -> 1 transition clears the store
    /// TTL on both the entry and the reverse index, so the code's lifetime
    /// is henceforth bounded only by runner presence.
    pub async fn mark_used(&self, code: &str) -> Result<()> {
        let Some(json) = self.store.get(&keys::code(code)).await? else {
            return Ok(());
        };
        let mut entry: CodeEntry = serde_json::from_str(&json)?;
        let first_use = entry.used_count == 0;
        entry.used_count += 1;
        // Plain SET drops the TTL, which is exactly the wanted semantics.
        self.store.set(&keys::code(code), &serde_json::to_string(&entry)?).await?;
        if first_use {
            self.store.persist(&keys::runner_code(&entry.runner_id)).await?;
        }
        Ok(())
    }

    /// Remove the entry and its reverse index. Idempotent. The reverse
    /// index is dropped only while it still names this code; a newer
    /// registration may have repointed it.
    pub async fn invalidate(&self, code: &str) -> Result<()> {
        if let Some(json) = self.store.get(&keys::code(code)).await? {
            if let Ok(entry) = serde_json::from_str::<CodeEntry>(&json) {
                if self.code_of(&entry.runner_id).await?.as_deref() == Some(code) {
                    self.store.del(&keys::runner_code(&entry.runner_id)).await?;
                }
            }
        }
        self.store.del(&keys::code(code)).await?;
        Ok(())
    }

    /// Current code advertised by a runner, if any.
    pub async fn code_of(&self, runner_id: &str) -> Result<Option<String>> {
        self.store.get(&keys::runner_code(runner_id)).await
    }
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod tests;
