// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Epoch-millisecond clock.
//!
//! All pairing state (code expiry, liveness windows, rate-limit windows) is
//! keyed to wall-clock epoch milliseconds so it can live in the shared store
//! and survive broker restarts. Tests shift a thread-local offset instead of
//! sleeping.

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    #[cfg(test)]
    let now = now + test_clock::offset_ms();

    now
}
