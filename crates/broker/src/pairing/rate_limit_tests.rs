// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::store::MemoryStore;
use crate::time::test_clock;

fn limiter() -> RateLimiter {
    RateLimiter::new(Arc::new(MemoryStore::new()))
}

#[tokio::test]
async fn below_threshold_is_not_banned() -> anyhow::Result<()> {
    let limiter = limiter();
    for _ in 0..4 {
        assert!(!limiter.record_failure("A1").await?);
    }
    assert!(!limiter.is_banned("A1").await?);
    assert_eq!(limiter.remaining_ban_secs("A1").await?, 0);
    Ok(())
}

#[tokio::test]
async fn fifth_failure_trips_the_ban() -> anyhow::Result<()> {
    let limiter = limiter();
    for _ in 0..4 {
        limiter.record_failure("A1").await?;
    }
    assert!(limiter.record_failure("A1").await?);
    assert!(limiter.is_banned("A1").await?);

    let remaining = limiter.remaining_ban_secs("A1").await?;
    assert!(remaining > 0 && remaining <= BAN_MS / 1000);
    Ok(())
}

#[tokio::test]
async fn same_millisecond_burst_counts_every_failure() -> anyhow::Result<()> {
    // All five failures land on the same clock reading; unique member
    // tags keep them distinct in the window.
    let limiter = limiter();
    for _ in 0..5 {
        limiter.record_failure("A1").await?;
    }
    assert!(limiter.is_banned("A1").await?);
    Ok(())
}

#[tokio::test]
async fn failures_outside_the_window_age_out() -> anyhow::Result<()> {
    let limiter = limiter();
    for _ in 0..4 {
        limiter.record_failure("A1").await?;
    }
    test_clock::advance_ms(WINDOW_MS + 1);
    // A fifth failure after the window holds only itself.
    assert!(!limiter.record_failure("A1").await?);
    assert!(!limiter.is_banned("A1").await?);
    Ok(())
}

#[tokio::test]
async fn ban_expires_after_its_window() -> anyhow::Result<()> {
    let limiter = limiter();
    for _ in 0..5 {
        limiter.record_failure("A1").await?;
    }
    assert!(limiter.is_banned("A1").await?);

    test_clock::advance_ms(BAN_MS + 1);
    assert!(!limiter.is_banned("A1").await?);
    assert_eq!(limiter.remaining_ban_secs("A1").await?, 0);
    Ok(())
}

#[tokio::test]
async fn remaining_ban_is_monotonically_non_increasing() -> anyhow::Result<()> {
    let limiter = limiter();
    for _ in 0..5 {
        limiter.record_failure("A1").await?;
    }

    let mut prev = limiter.remaining_ban_secs("A1").await?;
    for _ in 0..8 {
        test_clock::advance_ms(40_000);
        let now = limiter.remaining_ban_secs("A1").await?;
        assert!(now <= prev, "remaining ban increased: {prev} -> {now}");
        prev = now;
    }
    assert_eq!(prev, 0);
    Ok(())
}

#[tokio::test]
async fn reset_clears_failures_but_not_an_active_ban() -> anyhow::Result<()> {
    let limiter = limiter();
    for _ in 0..5 {
        limiter.record_failure("A1").await?;
    }
    limiter.reset("A1").await?;

    // Ban still stands.
    assert!(limiter.is_banned("A1").await?);
    assert!(limiter.remaining_ban_secs("A1").await?> 0);
    Ok(())
}

#[tokio::test]
async fn reset_restarts_the_counting_window() -> anyhow::Result<()> {
    let limiter = limiter();
    for _ in 0..4 {
        limiter.record_failure("A1").await?;
    }
    limiter.reset("A1").await?;

    // Four more failures after a reset stay below the threshold.
    for _ in 0..4 {
        assert!(!limiter.record_failure("A1").await?);
    }
    assert!(!limiter.is_banned("A1").await?);
    Ok(())
}

#[tokio::test]
async fn identities_are_limited_independently() -> anyhow::Result<()> {
    let limiter = limiter();
    for _ in 0..5 {
        limiter.record_failure("A1").await?;
    }
    assert!(limiter.is_banned("A1").await?);
    assert!(!limiter.is_banned("A2").await?);
    Ok(())
}
