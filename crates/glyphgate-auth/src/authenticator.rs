// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Credential authenticator — the central per-attempt state machine.
//
// Fixed guard order for every attempt, never rearranged:
//   rate limit (raw entered code) -> resolve identity -> account active
//   -> (face path) biometric enabled -> lock check -> credential compare.
//
// Only a genuine credential mismatch feeds the lockout counter; guard
// rejections short-circuit before the comparison, and malformed payloads
// are rejected without touching any counter. Rejections are never retried
// here — a retry would double-count failures.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use glyphgate_core::clock::Clock;
use glyphgate_core::config::AuthConfig;
use glyphgate_core::error::{AuthError, Result};
use glyphgate_core::types::{StudentIdentity, StudentProfile};
use glyphgate_store::IdentityStore;

use crate::audit::AuditTrail;
use crate::biometric::BiometricVerifier;
use crate::gate::{AuthorizationGate, LoginPath};
use crate::lockout::LockoutGuard;
use crate::ratelimit::{AttemptStore, RateLimiter};
use crate::token::{SessionClaims, TokenSigner};

/// Result of a successful login: a signed session token plus a projection
/// that excludes the PIN and the embedding.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub profile: StudentProfile,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Order-sensitive, length-sensitive PIN comparison. A length mismatch is
/// an ordinary mismatch, not an error.
pub fn pins_match(stored: &[String], entered: &[String]) -> bool {
    stored.len() == entered.len() && stored.iter().zip(entered.iter()).all(|(a, b)| a == b)
}

/// Orchestrates the guard chain, the credential comparison, and token
/// issuance for both credential paths.
pub struct CredentialAuthenticator {
    identities: Arc<Mutex<IdentityStore>>,
    rate_limiter: RateLimiter,
    gate: AuthorizationGate,
    lockout: LockoutGuard,
    verifier: BiometricVerifier,
    signer: TokenSigner,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
}

impl CredentialAuthenticator {
    pub fn new(
        identities: Arc<Mutex<IdentityStore>>,
        audit: Arc<Mutex<AuditTrail>>,
        attempts: Arc<dyn AttemptStore>,
        signer: TokenSigner,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(attempts, &config, Arc::clone(&clock));
        let gate = AuthorizationGate::new(Arc::clone(&clock));
        let lockout = LockoutGuard::new(
            Arc::clone(&identities),
            audit,
            config.clone(),
            Arc::clone(&clock),
        );
        let verifier = BiometricVerifier::new(config.similarity_threshold);
        Self {
            identities,
            rate_limiter,
            gate,
            lockout,
            verifier,
            signer,
            config,
            clock,
        }
    }

    /// Login with the ordered visual PIN.
    #[instrument(skip(self, entered_pin), fields(code = entered_code))]
    pub fn login_pin(&self, entered_code: &str, entered_pin: &[String]) -> Result<LoginSuccess> {
        self.rate_limiter.check(entered_code)?;
        if entered_pin.is_empty() {
            return Err(AuthError::Invalid("PIN sequence must not be empty".into()));
        }

        let student = self.resolve(entered_code)?;
        self.gate.clear(&student, LoginPath::Pin)?;

        if !pins_match(&student.visual_pin, entered_pin) {
            debug!(student_id = %student.id, "visual PIN mismatch");
            self.lockout.record_failure(&student)?;
            return Err(AuthError::CredentialMismatch);
        }

        self.issue(&student)
    }

    /// Login with a face-embedding probe.
    #[instrument(skip(self, probe), fields(code = entered_code, dims = probe.len()))]
    pub fn login_face(&self, entered_code: &str, probe: &[f32]) -> Result<LoginSuccess> {
        self.rate_limiter.check(entered_code)?;
        if probe.is_empty() {
            return Err(AuthError::Invalid("embedding must not be empty".into()));
        }

        let student = self.resolve(entered_code)?;
        self.gate.clear(&student, LoginPath::Face)?;

        // The gate guarantees the embedding is present on the face path.
        let stored = student
            .face_embedding
            .as_deref()
            .ok_or(AuthError::FaceAuthDisabled)?;

        // A malformed probe (wrong dimensionality) propagates as Invalid
        // without feeding the failure counter.
        if !self.verifier.compare(stored, probe)? {
            debug!(student_id = %student.id, "face probe below threshold");
            self.lockout.record_failure(&student)?;
            return Err(AuthError::CredentialMismatch);
        }

        self.issue(&student)
    }

    fn resolve(&self, entered_code: &str) -> Result<StudentIdentity> {
        self.identities
            .lock()
            .map_err(|_| AuthError::Database("identity store mutex poisoned".into()))?
            .get_by_code(entered_code)?
            .ok_or(AuthError::NotFound)
    }

    fn issue(&self, student: &StudentIdentity) -> Result<LoginSuccess> {
        self.lockout.record_success(&student.id)?;

        let now = self.clock.now();
        let expires_at = now + self.config.session_token_ttl();
        let claims = SessionClaims {
            sub: student.id,
            code: student.enrollment_code.clone(),
            role: "student".into(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let session_token = self.signer.issue(&claims)?;

        info!(student_id = %student.id, "student session issued");
        Ok(LoginSuccess {
            profile: StudentProfile::from(student),
            session_token,
            expires_at,
        })
    }
}
