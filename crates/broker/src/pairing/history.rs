// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only bounded log of pairing attempts.
//!
//! Recording is best-effort: a store fault is logged and swallowed so a
//! history write can never abort the surrounding protocol operation. The
//! order of operations is decide, commit, then record.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::store::{keys, SharedStore};

pub const HISTORY_CAP: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: u64,
    pub app_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_id: Option<String>,
    pub code: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

pub struct HistoryRecorder {
    store: SharedStore,
}

impl HistoryRecorder {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Append an entry, evicting the oldest past the cap. Never fails the
    /// caller.
    pub async fn record(&self, entry: HistoryEntry) {
        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(err = %e, "history entry serialization failed");
                return;
            }
        };
        if let Err(e) = self.store.lpush_ltrim(&keys::history(), &json, HISTORY_CAP).await {
            tracing::warn!(err = %e, "history append failed");
        }
    }

    /// Read up to `limit` entries, newest first. Unparseable rows are
    /// skipped.
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let rows = self.store.lrange(&keys::history(), limit).await?;
        Ok(rows.iter().filter_map(|row| serde_json::from_str(row).ok()).collect())
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
