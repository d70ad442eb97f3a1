// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-identity lockout state machine, shared by both credential paths.
//
// CLOSED (attempts = 0, no lock) counts failures up to the configured
// threshold, then transitions to OPEN (lock_until set, counter reset) and
// stays there until either the lock elapses or a successful authentication
// clears it. Failures while OPEN are ignored — they neither extend the lock
// nor advance the counter.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::info;

use glyphgate_core::clock::Clock;
use glyphgate_core::config::AuthConfig;
use glyphgate_core::error::{AuthError, Result};
use glyphgate_core::types::{StudentId, StudentIdentity};
use glyphgate_store::{FailureOutcome, IdentityStore};

use crate::audit::{self, AuditAction, AuditActor, AuditDetail, AuditTrail};

/// Reject with `Locked` while a lock is active, reporting the remaining
/// wait rounded up to whole minutes.
pub fn check_lock(student: &StudentIdentity, now: DateTime<Utc>) -> Result<()> {
    if let Some(until) = student.lock_until {
        if until > now {
            let remaining_secs = (until - now).num_seconds().max(1);
            let minutes = (remaining_secs + 59) / 60;
            return Err(AuthError::Locked { minutes });
        }
    }
    Ok(())
}

/// Failure counter and timed lock over the identity store.
pub struct LockoutGuard {
    identities: Arc<Mutex<IdentityStore>>,
    audit: Arc<Mutex<AuditTrail>>,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
}

impl LockoutGuard {
    pub fn new(
        identities: Arc<Mutex<IdentityStore>>,
        audit: Arc<Mutex<AuditTrail>>,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identities,
            audit,
            config,
            clock,
        }
    }

    /// Gate check used before any credential comparison.
    pub fn check_gate(&self, student: &StudentIdentity) -> Result<()> {
        check_lock(student, self.clock.now())
    }

    /// Count a failed attempt; when the threshold is crossed, the store
    /// sets the lock atomically and exactly one `LOGIN_LOCK_TRIGGERED`
    /// audit event is emitted.
    pub fn record_failure(&self, student: &StudentIdentity) -> Result<()> {
        let now = self.clock.now();
        let outcome = self
            .identities
            .lock()
            .map_err(|_| AuthError::Database("identity store mutex poisoned".into()))?
            .record_failure(
                &student.id,
                now,
                self.config.max_failed_attempts,
                self.config.lock_duration(),
            )?;

        if let FailureOutcome::LockTriggered { until } = outcome {
            info!(student_id = %student.id, until = %until, "login lock triggered");
            audit::record_best_effort(
                &self.audit,
                AuditAction::LoginLockTriggered,
                &AuditActor::System,
                &student.id,
                &AuditDetail::LockTriggered {
                    until,
                    threshold: self.config.max_failed_attempts,
                },
            );
        }
        Ok(())
    }

    /// Unconditionally reset the counter and clear any lock.
    pub fn record_success(&self, student_id: &StudentId) -> Result<()> {
        self.identities
            .lock()
            .map_err(|_| AuthError::Database("identity store mutex poisoned".into()))?
            .clear_failures(student_id)
    }
}
