// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};

/// Configuration for the tether broker.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "tetherd", about = "Pairing and routing broker for remote terminal control")]
pub struct BrokerConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "TETHER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9600, env = "TETHER_PORT")]
    pub port: u16,

    /// HS256 secret for verifying app identity tokens.
    #[arg(long, env = "TETHER_TOKEN_SECRET")]
    pub token_secret: String,

    /// Per-runner shared secrets: path to a JSON object file
    /// (`{"runner-id": "secret"}`), or inline `id=secret` pairs separated
    /// by commas.
    #[arg(long, env = "TETHER_RUNNER_SECRETS")]
    pub runner_secrets: String,

    /// Shared store backend.
    #[arg(long, value_enum, default_value_t = StoreKind::Redis, env = "TETHER_STORE")]
    pub store: StoreKind,

    /// Redis connection URL.
    #[arg(long, default_value = "redis://127.0.0.1:6379/0", env = "TETHER_REDIS_URL")]
    pub redis_url: String,

    /// Allowed CORS origins. Unset means permissive (dev posture);
    /// production deployments should restrict this.
    #[arg(long = "cors-origin", env = "TETHER_CORS_ORIGIN", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    Redis,
    /// In-process store; single-node dev and tests only.
    Memory,
}

impl BrokerConfig {
    /// Resolve the runner secret table from the configured source.
    pub fn runner_secret_map(&self) -> Result<HashMap<String, String>> {
        let raw = self.runner_secrets.trim();
        if raw.ends_with(".json") || std::path::Path::new(raw).is_file() {
            let contents = std::fs::read_to_string(raw)
                .with_context(|| format!("reading runner secrets file {raw}"))?;
            return serde_json::from_str(&contents)
                .with_context(|| format!("parsing runner secrets file {raw}"));
        }

        let mut map = HashMap::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (id, secret) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("invalid runner secret entry: {pair}"))?;
            map.insert(id.trim().to_owned(), secret.trim().to_owned());
        }
        if map.is_empty() {
            return Err(anyhow!("no runner secrets configured"));
        }
        Ok(map)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
