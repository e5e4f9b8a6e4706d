// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error kinds exposed to clients.
///
/// The string identifiers are wire contract; message strings are advisory
/// and must not be parsed by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidFormat,
    CodeNotFound,
    CodeExpired,
    DuplicateCode,
    RunnerOffline,
    InvalidSecret,
    RateLimited,
    RegistrationExhausted,
    NotPaired,
    NotAuthenticated,
    NetworkError,
    BadRequest,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::CodeNotFound => "CODE_NOT_FOUND",
            Self::CodeExpired => "CODE_EXPIRED",
            Self::DuplicateCode => "DUPLICATE_CODE",
            Self::RunnerOffline => "RUNNER_OFFLINE",
            Self::InvalidSecret => "INVALID_SECRET",
            Self::RateLimited => "RATE_LIMITED",
            Self::RegistrationExhausted => "REGISTRATION_EXHAUSTED",
            Self::NotPaired => "NOT_PAIRED",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::BadRequest => "BAD_REQUEST",
        }
    }

    /// Default advisory message for this kind.
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "pairing code must match XXX-XXX-XXX (A-Z, 0-9)",
            Self::CodeNotFound => "no such pairing code",
            Self::CodeExpired => "pairing code expired",
            Self::DuplicateCode => "pairing code already registered",
            Self::RunnerOffline => "runner is not online",
            Self::InvalidSecret => "runner secret does not match",
            Self::RateLimited => "too many failed attempts",
            Self::RegistrationExhausted => "could not register a unique pairing code",
            Self::NotPaired => "not paired with this runner",
            Self::NotAuthenticated => "transport is not authenticated",
            Self::NetworkError => "store operation failed, retry advised",
            Self::BadRequest => "malformed or unknown message",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Top-level error response envelope for HTTP endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}
