// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;
use crate::pairing::engine::Engine;
use crate::store::SharedStore;

/// Shared broker state.
pub struct BrokerState {
    pub engine: Engine,
    pub config: BrokerConfig,
    pub shutdown: CancellationToken,
}

impl BrokerState {
    pub fn new(
        config: BrokerConfig,
        store: SharedStore,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let runner_secrets = config.runner_secret_map()?;
        Ok(Self { engine: Engine::new(store, runner_secrets), config, shutdown })
    }
}
