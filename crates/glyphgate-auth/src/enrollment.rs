// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Enrollment session lifecycle — single-use, time-boxed authorization to
// capture one biometric sample for one student.
//
// A linked caretaker opens a session and hands the token to the capture
// device; the device later redeems it with an embedding. The token itself
// is the credential for completion, so only its SHA-256 is persisted.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use glyphgate_core::clock::Clock;
use glyphgate_core::config::AuthConfig;
use glyphgate_core::error::{AuthError, Result};
use glyphgate_core::types::{Caretaker, EnrollmentSession, StudentId};
use glyphgate_store::{ConsumeOutcome, EnrollmentStore, IdentityStore};

use crate::audit::{self, AuditAction, AuditActor, AuditDetail, AuditTrail};
use crate::token::generate_enrollment_token;

/// SHA-256 hex digest of an enrollment token, as stored at rest.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// A freshly issued session: the raw token leaves the system exactly once,
/// in this value.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues, validates, and consumes enrollment sessions.
pub struct EnrollmentSessionManager {
    identities: Arc<Mutex<IdentityStore>>,
    sessions: Arc<Mutex<EnrollmentStore>>,
    audit: Arc<Mutex<AuditTrail>>,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
}

impl EnrollmentSessionManager {
    pub fn new(
        identities: Arc<Mutex<IdentityStore>>,
        sessions: Arc<Mutex<EnrollmentStore>>,
        audit: Arc<Mutex<AuditTrail>>,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identities,
            sessions,
            audit,
            config,
            clock,
        }
    }

    fn identities(&self) -> Result<std::sync::MutexGuard<'_, IdentityStore>> {
        self.identities
            .lock()
            .map_err(|_| AuthError::Database("identity store mutex poisoned".into()))
    }

    fn sessions(&self) -> Result<std::sync::MutexGuard<'_, EnrollmentStore>> {
        self.sessions
            .lock()
            .map_err(|_| AuthError::Database("session store mutex poisoned".into()))
    }

    /// Open a session for `student_id` on behalf of a linked caretaker.
    #[instrument(skip(self), fields(student_id = %student_id, requester = %requester.user_id))]
    pub fn create_session(
        &self,
        student_id: &StudentId,
        requester: &Caretaker,
    ) -> Result<IssuedSession> {
        let student = self
            .identities()?
            .get_by_id(student_id)?
            .ok_or(AuthError::NotFound)?;
        if !student.is_linked(&requester.user_id) {
            return Err(AuthError::NotLinked);
        }

        let token = generate_enrollment_token()?;
        let now = self.clock.now();
        let expires_at = now + self.config.enrollment_ttl();

        let mut session = EnrollmentSession::new(student.id, hash_token(&token), expires_at);
        session.created_at = now;
        self.sessions()?.insert(&session)?;

        info!(student_id = %student.id, "enrollment session issued");
        Ok(IssuedSession { token, expires_at })
    }

    /// Read-only check, e.g. for a capture page deciding whether to start
    /// the camera. Does not consume the token.
    pub fn validate_token(&self, token: &str) -> Result<StudentId> {
        let session = self
            .sessions()?
            .lookup(&hash_token(token))?
            .ok_or(AuthError::SessionNotFound)?;

        if session.used {
            return Err(AuthError::SessionConsumed);
        }
        if session.expires_at <= self.clock.now() {
            return Err(AuthError::SessionExpired);
        }
        Ok(session.student_id)
    }

    /// Redeem the token with a captured embedding.
    ///
    /// The store-level CAS on `used` runs before any student mutation, so
    /// duplicate or retried completions write at most one embedding; losers
    /// see the distinguished rejection and the student row stays untouched.
    #[instrument(skip_all)]
    pub fn complete_enrollment(&self, token: &str, embedding: &[f32]) -> Result<StudentId> {
        if embedding.is_empty() {
            return Err(AuthError::Invalid("embedding must not be empty".into()));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(AuthError::Invalid(
                "embedding contains non-finite values".into(),
            ));
        }

        let outcome = self.sessions()?.consume(&hash_token(token), self.clock.now())?;
        let student_id = match outcome {
            ConsumeOutcome::Consumed(student_id) => student_id,
            ConsumeOutcome::NotFound => return Err(AuthError::SessionNotFound),
            ConsumeOutcome::Expired => return Err(AuthError::SessionExpired),
            ConsumeOutcome::AlreadyUsed => return Err(AuthError::SessionConsumed),
        };

        self.identities()?.write_embedding(&student_id, embedding)?;

        audit::record_best_effort(
            &self.audit,
            AuditAction::SessionFaceEnrolled,
            &AuditActor::System,
            &student_id,
            &AuditDetail::FaceEnrolled {
                embedding_dims: embedding.len(),
            },
        );

        info!(student_id = %student_id, dims = embedding.len(), "face enrollment completed");
        Ok(student_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use glyphgate_core::clock::ManualClock;
    use glyphgate_core::types::{CaretakerRole, StudentIdentity, UserId};

    struct Fixture {
        manager: EnrollmentSessionManager,
        identities: Arc<Mutex<IdentityStore>>,
        audit: Arc<Mutex<AuditTrail>>,
        clock: ManualClock,
        student: StudentIdentity,
        caretaker: Caretaker,
    }

    fn fixture() -> Fixture {
        let identities = Arc::new(Mutex::new(IdentityStore::open_in_memory().unwrap()));
        let sessions = Arc::new(Mutex::new(EnrollmentStore::open_in_memory().unwrap()));
        let audit = Arc::new(Mutex::new(AuditTrail::open_in_memory().unwrap()));
        let clock = ManualClock::new(Utc::now());

        let caretaker = Caretaker {
            user_id: UserId::new(),
            role: CaretakerRole::Teacher,
        };
        let student = StudentIdentity::new(
            "Mina",
            "DX-20250007",
            vec!["star".into()],
            vec![caretaker.user_id],
        );
        identities.lock().unwrap().insert(&student).unwrap();

        let manager = EnrollmentSessionManager::new(
            Arc::clone(&identities),
            sessions,
            Arc::clone(&audit),
            AuthConfig::default(),
            Arc::new(clock.clone()),
        );
        Fixture {
            manager,
            identities,
            audit,
            clock,
            student,
            caretaker,
        }
    }

    #[test]
    fn session_expires_at_now_plus_ttl() {
        let f = fixture();
        let issued = f
            .manager
            .create_session(&f.student.id, &f.caretaker)
            .unwrap();
        assert_eq!(issued.expires_at, f.clock.now() + Duration::minutes(10));
        assert_eq!(issued.token.len(), 64);
    }

    #[test]
    fn unlinked_caretaker_is_rejected() {
        let f = fixture();
        let stranger = Caretaker {
            user_id: UserId::new(),
            role: CaretakerRole::Parent,
        };
        assert!(matches!(
            f.manager.create_session(&f.student.id, &stranger),
            Err(AuthError::NotLinked)
        ));
    }

    #[test]
    fn unknown_student_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.manager.create_session(&StudentId::new(), &f.caretaker),
            Err(AuthError::NotFound)
        ));
    }

    #[test]
    fn validate_passes_then_expires() {
        let f = fixture();
        let issued = f
            .manager
            .create_session(&f.student.id, &f.caretaker)
            .unwrap();

        assert_eq!(f.manager.validate_token(&issued.token).unwrap(), f.student.id);

        // Eleven minutes later the ten-minute session has expired.
        f.clock.advance(Duration::minutes(11));
        assert!(matches!(
            f.manager.validate_token(&issued.token),
            Err(AuthError::SessionExpired)
        ));
    }

    #[test]
    fn completion_writes_embedding_and_audits() {
        let f = fixture();
        let issued = f
            .manager
            .create_session(&f.student.id, &f.caretaker)
            .unwrap();

        let embedding = vec![0.1f32, 0.2, 0.3, 0.4];
        let student_id = f
            .manager
            .complete_enrollment(&issued.token, &embedding)
            .unwrap();
        assert_eq!(student_id, f.student.id);

        let updated = f
            .identities
            .lock()
            .unwrap()
            .get_by_id(&f.student.id)
            .unwrap()
            .unwrap();
        assert_eq!(updated.face_embedding, Some(embedding));
        assert!(updated.face_auth_enabled);

        let entries = f
            .audit
            .lock()
            .unwrap()
            .entries_for_student(&f.student.id)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::SessionFaceEnrolled);
    }

    #[test]
    fn second_completion_sees_consumed_and_mutates_nothing() {
        let f = fixture();
        let issued = f
            .manager
            .create_session(&f.student.id, &f.caretaker)
            .unwrap();

        let first = vec![0.1f32, 0.2, 0.3];
        f.manager.complete_enrollment(&issued.token, &first).unwrap();

        let second = vec![0.9f32, 0.9, 0.9];
        assert!(matches!(
            f.manager.complete_enrollment(&issued.token, &second),
            Err(AuthError::SessionConsumed)
        ));

        // The stored embedding reflects exactly the first submission.
        let stored = f
            .identities
            .lock()
            .unwrap()
            .get_by_id(&f.student.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.face_embedding, Some(first));
    }

    #[test]
    fn expired_token_cannot_complete_even_if_unused() {
        let f = fixture();
        let issued = f
            .manager
            .create_session(&f.student.id, &f.caretaker)
            .unwrap();

        f.clock.advance(Duration::minutes(11));
        assert!(matches!(
            f.manager.complete_enrollment(&issued.token, &[0.1, 0.2]),
            Err(AuthError::SessionExpired)
        ));
    }

    #[test]
    fn unknown_token_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.manager.validate_token("not-a-real-token"),
            Err(AuthError::SessionNotFound)
        ));
        assert!(matches!(
            f.manager.complete_enrollment("not-a-real-token", &[0.1]),
            Err(AuthError::SessionNotFound)
        ));
    }

    #[test]
    fn malformed_embedding_never_touches_the_token() {
        let f = fixture();
        let issued = f
            .manager
            .create_session(&f.student.id, &f.caretaker)
            .unwrap();

        assert!(matches!(
            f.manager.complete_enrollment(&issued.token, &[]),
            Err(AuthError::Invalid(_))
        ));
        assert!(matches!(
            f.manager.complete_enrollment(&issued.token, &[f32::NAN]),
            Err(AuthError::Invalid(_))
        ));

        // Token still valid after the rejected payloads.
        assert!(f.manager.validate_token(&issued.token).is_ok());
    }
}
