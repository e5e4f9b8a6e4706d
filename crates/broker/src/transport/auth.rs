// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity verification at the transport boundary.
//!
//! Apps authenticate with an HS256 identity token whose `sub` claim is the
//! stable app identity; issuance happens elsewhere, this side only
//! verifies. Runners authenticate in-band with a per-runner shared secret
//! from configuration.

use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::ErrorKind;

/// Constant-time string comparison to prevent timing side-channel attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    sub: String,
}

/// Verify an identity token and return the stable app identity it names.
pub fn verify_identity_token(secret: &str, token: &str) -> Result<String, ErrorKind> {
    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(secret.as_bytes());
    match jsonwebtoken::decode::<IdentityClaims>(token, &key, &validation) {
        Ok(data) if !data.claims.sub.is_empty() => Ok(data.claims.sub),
        Ok(_) => Err(ErrorKind::NotAuthenticated),
        Err(e) => {
            tracing::debug!(err = %e, "identity token rejected");
            Err(ErrorKind::NotAuthenticated)
        }
    }
}

/// Extract and verify a Bearer identity token from HTTP headers.
pub fn verify_bearer(headers: &HeaderMap, secret: &str) -> Result<String, ErrorKind> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ErrorKind::NotAuthenticated)?;
    let token = header.strip_prefix("Bearer ").ok_or(ErrorKind::NotAuthenticated)?;
    verify_identity_token(secret, token)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
