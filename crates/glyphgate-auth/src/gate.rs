// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Authorization gate — ordered, short-circuiting pass/fail checks applied
// to a loaded identity before any credential comparison.
//
// The order is fixed and never rearranged: account-active, then (face path
// only) biometric-enabled, then lock-not-active. A failing check aborts the
// chain with its designated rejection; later checks never run, so a
// disabled face path reports Forbidden even when a lock is also active.

use std::sync::Arc;

use glyphgate_core::clock::Clock;
use glyphgate_core::error::{AuthError, Result};
use glyphgate_core::types::StudentIdentity;

use crate::lockout::check_lock;

/// Which credential path a login attempt is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPath {
    Pin,
    Face,
}

/// Guard chain over a loaded student identity.
pub struct AuthorizationGate {
    clock: Arc<dyn Clock>,
}

impl AuthorizationGate {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Run the full chain for the given path.
    pub fn clear(&self, student: &StudentIdentity, path: LoginPath) -> Result<()> {
        self.require_active(student)?;
        if path == LoginPath::Face {
            self.require_face_enabled(student)?;
        }
        self.require_unlocked(student)?;
        Ok(())
    }

    pub fn require_active(&self, student: &StudentIdentity) -> Result<()> {
        if !student.is_active {
            return Err(AuthError::AccountDisabled);
        }
        Ok(())
    }

    /// The face path needs both the caretaker-controlled flag and a
    /// completed enrollment; either missing is Forbidden, not a mismatch.
    pub fn require_face_enabled(&self, student: &StudentIdentity) -> Result<()> {
        if !student.face_auth_enabled || student.face_embedding.is_none() {
            return Err(AuthError::FaceAuthDisabled);
        }
        Ok(())
    }

    pub fn require_unlocked(&self, student: &StudentIdentity) -> Result<()> {
        check_lock(student, self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use glyphgate_core::clock::SystemClock;

    fn gate() -> AuthorizationGate {
        AuthorizationGate::new(Arc::new(SystemClock))
    }

    fn student() -> StudentIdentity {
        let mut s = StudentIdentity::new("Mina", "DX-20250007", vec!["star".into()], vec![]);
        s.face_embedding = Some(vec![0.1, 0.2, 0.3]);
        s.face_auth_enabled = true;
        s
    }

    #[test]
    fn clears_a_healthy_identity_on_both_paths() {
        let s = student();
        assert!(gate().clear(&s, LoginPath::Pin).is_ok());
        assert!(gate().clear(&s, LoginPath::Face).is_ok());
    }

    #[test]
    fn inactive_account_fails_first() {
        let mut s = student();
        s.is_active = false;
        // Also locked — but the active check short-circuits before the lock.
        s.lock_until = Some(Utc::now() + Duration::minutes(5));
        assert!(matches!(
            gate().clear(&s, LoginPath::Pin),
            Err(AuthError::AccountDisabled)
        ));
    }

    #[test]
    fn face_path_requires_the_flag() {
        let mut s = student();
        s.face_auth_enabled = false;
        assert!(matches!(
            gate().clear(&s, LoginPath::Face),
            Err(AuthError::FaceAuthDisabled)
        ));
        // The PIN path is unaffected by the face flag.
        assert!(gate().clear(&s, LoginPath::Pin).is_ok());
    }

    #[test]
    fn face_path_requires_an_enrolled_embedding() {
        let mut s = student();
        s.face_embedding = None;
        assert!(matches!(
            gate().clear(&s, LoginPath::Face),
            Err(AuthError::FaceAuthDisabled)
        ));
    }

    #[test]
    fn active_lock_blocks_both_paths() {
        let mut s = student();
        s.lock_until = Some(Utc::now() + Duration::minutes(3));
        assert!(matches!(
            gate().clear(&s, LoginPath::Pin),
            Err(AuthError::Locked { .. })
        ));
        assert!(matches!(
            gate().clear(&s, LoginPath::Face),
            Err(AuthError::Locked { .. })
        ));
    }

    #[test]
    fn elapsed_lock_does_not_block() {
        let mut s = student();
        s.lock_until = Some(Utc::now() - Duration::seconds(1));
        assert!(gate().clear(&s, LoginPath::Pin).is_ok());
    }
}
