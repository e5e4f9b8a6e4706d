// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tether broker: pairing and routing fabric for remote terminal control.
//!
//! Runners advertise short pairing codes; apps exchange a code for a
//! session bound to exactly that runner; the terminal bridge refuses any
//! app that has not paired. All cross-instance state lives in the shared
//! store.

pub mod bridge;
pub mod config;
pub mod error;
pub mod pairing;
pub mod registry;
pub mod state;
pub mod store;
pub mod time;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::{BrokerConfig, StoreKind};
use crate::state::BrokerState;
use crate::store::{MemoryStore, RedisStore, SharedStore};
use crate::transport::build_router;

/// Run the broker until shutdown.
pub async fn run(config: BrokerConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let store: SharedStore = match config.store {
        StoreKind::Redis => Arc::new(RedisStore::connect(&config.redis_url).await?),
        StoreKind::Memory => {
            tracing::warn!("memory store selected; state is neither shared nor durable");
            Arc::new(MemoryStore::new())
        }
    };

    let state = Arc::new(BrokerState::new(config, store, shutdown.clone())?);

    tracing::info!("tether broker listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
