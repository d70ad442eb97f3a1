// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Token primitives — signed session tokens and random enrollment tokens.
//
// Session tokens are HMAC-SHA256 over a JSON claims payload, encoded as
// `hex(payload).hex(tag)`. Enrollment tokens are 32 bytes (256 bits) from
// the system CSPRNG, hex-encoded; only their SHA-256 is ever persisted.

use chrono::{DateTime, Utc};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use glyphgate_core::error::{AuthError, Result};
use glyphgate_core::types::StudentId;

/// Claims carried by an issued student session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject student id.
    pub sub: StudentId,
    /// Enrollment code, for display and re-resolution.
    pub code: String,
    /// Role discriminant; always `"student"` for issued logins.
    pub role: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Issues and verifies signed, time-limited session tokens.
pub struct TokenSigner {
    key: hmac::Key,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Sign the claims into a transportable token string.
    pub fn issue(&self, claims: &SessionClaims) -> Result<String> {
        let payload = serde_json::to_vec(claims)?;
        let tag = hmac::sign(&self.key, &payload);
        Ok(format!(
            "{}.{}",
            hex::encode(&payload),
            hex::encode(tag.as_ref())
        ))
    }

    /// Verify signature and expiry; returns the claims on success.
    ///
    /// Malformed or tampered tokens are all `TokenInvalid` — the caller
    /// learns nothing about which part failed.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims> {
        let (payload_hex, tag_hex) = token.split_once('.').ok_or(AuthError::TokenInvalid)?;
        let payload = hex::decode(payload_hex).map_err(|_| AuthError::TokenInvalid)?;
        let tag = hex::decode(tag_hex).map_err(|_| AuthError::TokenInvalid)?;

        hmac::verify(&self.key, &payload, &tag).map_err(|_| AuthError::TokenInvalid)?;

        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| AuthError::TokenInvalid)?;
        if claims.exp <= now.timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }
}

/// Generate an opaque enrollment token: 256 bits from the system CSPRNG,
/// hex-encoded for transport.
pub fn generate_enrollment_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AuthError::Signing("system RNG unavailable".into()))?;
    Ok(hex::encode(bytes))
}
