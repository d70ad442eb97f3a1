// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Glyphgate.

use thiserror::Error;

/// Top-level error type for all Glyphgate operations.
///
/// Guard and verification failures surface as dedicated variants so that
/// callers can branch on them without string matching; unexpected store or
/// signing failures carry a detail string.
#[derive(Debug, Error)]
pub enum AuthError {
    // -- Identity & credentials --
    #[error("student not found")]
    NotFound,

    #[error("student account is disabled")]
    AccountDisabled,

    #[error("face authentication is not enabled")]
    FaceAuthDisabled,

    #[error("credentials did not match")]
    CredentialMismatch,

    // -- Throttling & lockout --
    #[error("too many attempts, please wait and try again")]
    RateLimited,

    #[error("account locked, try again in {minutes} minute(s)")]
    Locked { minutes: i64 },

    // -- Enrollment sessions --
    #[error("enrollment session not found")]
    SessionNotFound,

    #[error("enrollment session expired")]
    SessionExpired,

    #[error("enrollment session already used")]
    SessionConsumed,

    // -- Caretaker authorization --
    #[error("caretaker is not linked to this student")]
    NotLinked,

    // -- Payload validation --
    #[error("invalid request: {0}")]
    Invalid(String),

    // -- Session tokens --
    #[error("session token invalid")]
    TokenInvalid,

    #[error("session token expired")]
    TokenExpired,

    // -- Storage / signing --
    #[error("database error: {0}")]
    Database(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AuthError>;
