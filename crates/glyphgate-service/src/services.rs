// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service facade — initialises the stores and authentication
// subsystems and provides the methods an embedding application calls.
//
// The rusqlite-backed stores are `Send` but not `Sync`, so they are wrapped
// in `Arc<Mutex<>>` for safe sharing. Mutex contention is minimal because
// all operations are fast (sub-millisecond SQLite queries).

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{info, instrument};

use glyphgate_auth::audit::{self, AuditAction, AuditActor, AuditDetail, AuditEntry, AuditTrail};
use glyphgate_auth::authenticator::{CredentialAuthenticator, LoginSuccess};
use glyphgate_auth::enrollment::{EnrollmentSessionManager, IssuedSession};
use glyphgate_auth::ratelimit::InMemoryAttemptStore;
use glyphgate_auth::token::{SessionClaims, TokenSigner};
use glyphgate_core::clock::{Clock, SystemClock};
use glyphgate_core::config::AuthConfig;
use glyphgate_core::error::{AuthError, Result};
use glyphgate_core::types::{Caretaker, StudentId, StudentIdentity, UserId};
use glyphgate_store::{EnrollmentStore, IdentityStore};

/// Shared authentication services.
///
/// All fields are cheaply cloneable (Arc-wrapped) so that the struct can be
/// passed into closures and worker threads without lifetime issues.
#[derive(Clone)]
pub struct AuthServices {
    identities: Arc<Mutex<IdentityStore>>,
    audit: Arc<Mutex<AuditTrail>>,
    authenticator: Arc<CredentialAuthenticator>,
    enrollment: Arc<EnrollmentSessionManager>,
    signer: Arc<TokenSigner>,
    clock: Arc<dyn Clock>,
}

impl AuthServices {
    /// Initialise all services against on-disk databases under `data_dir`.
    /// Call once at application startup.
    #[instrument(skip_all, fields(data_dir = %data_dir.as_ref().display()))]
    pub fn open(data_dir: impl AsRef<Path>, secret: &[u8], config: AuthConfig) -> Result<Self> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let identities = IdentityStore::open(dir.join("identities.db"))?;
        let sessions = EnrollmentStore::open(dir.join("enrollment.db"))?;
        let audit = AuditTrail::open(dir.join("audit.db"))?;

        info!("auth services initialised");
        Self::assemble(identities, sessions, audit, secret, config, Arc::new(SystemClock))
    }

    /// Initialise against in-memory databases with an injected clock
    /// (useful for tests).
    pub fn open_in_memory(
        secret: &[u8],
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let identities = IdentityStore::open_in_memory()?;
        let sessions = EnrollmentStore::open_in_memory()?;
        let audit = AuditTrail::open_in_memory()?;
        Self::assemble(identities, sessions, audit, secret, config, clock)
    }

    fn assemble(
        identities: IdentityStore,
        sessions: EnrollmentStore,
        audit: AuditTrail,
        secret: &[u8],
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let identities = Arc::new(Mutex::new(identities));
        let sessions = Arc::new(Mutex::new(sessions));
        let audit = Arc::new(Mutex::new(audit));

        let authenticator = Arc::new(CredentialAuthenticator::new(
            Arc::clone(&identities),
            Arc::clone(&audit),
            Arc::new(InMemoryAttemptStore::new()),
            TokenSigner::new(secret),
            config.clone(),
            Arc::clone(&clock),
        ));
        let enrollment = Arc::new(EnrollmentSessionManager::new(
            Arc::clone(&identities),
            sessions,
            Arc::clone(&audit),
            config,
            Arc::clone(&clock),
        ));

        Ok(Self {
            identities,
            audit,
            authenticator,
            enrollment,
            signer: Arc::new(TokenSigner::new(secret)),
            clock,
        })
    }

    // -- Login ---------------------------------------------------------------

    /// Authenticate with an enrollment code and ordered visual PIN.
    pub fn login_pin(&self, entered_code: &str, entered_pin: &[String]) -> Result<LoginSuccess> {
        self.authenticator.login_pin(entered_code, entered_pin)
    }

    /// Authenticate with an enrollment code and a face-embedding probe.
    pub fn login_face(&self, entered_code: &str, probe: &[f32]) -> Result<LoginSuccess> {
        self.authenticator.login_face(entered_code, probe)
    }

    /// Verify an issued session token and return its claims.
    pub fn verify_session(&self, token: &str) -> Result<SessionClaims> {
        self.signer.verify(token, self.clock.now())
    }

    /// Whether the face credential path is currently usable for the given
    /// enrollment code, so a login screen can decide which options to show.
    pub fn check_face_available(&self, entered_code: &str) -> Result<bool> {
        let student = self
            .identities()?
            .get_by_code(entered_code)?
            .ok_or(AuthError::NotFound)?;
        Ok(student.face_auth_enabled && student.face_embedding.is_some())
    }

    // -- Enrollment ----------------------------------------------------------

    /// Open a biometric enrollment session on behalf of a linked caretaker.
    pub fn create_enrollment_session(
        &self,
        student_id: &StudentId,
        requester: &Caretaker,
    ) -> Result<IssuedSession> {
        self.enrollment.create_session(student_id, requester)
    }

    /// Check an enrollment token without consuming it.
    pub fn validate_enrollment_token(&self, token: &str) -> Result<StudentId> {
        self.enrollment.validate_token(token)
    }

    /// Redeem an enrollment token with a captured embedding.
    pub fn complete_enrollment(&self, token: &str, embedding: &[f32]) -> Result<StudentId> {
        self.enrollment.complete_enrollment(token, embedding)
    }

    // -- Registration and linking --------------------------------------------

    /// Register a new student identity.
    ///
    /// `caretakers` seeds the linkage list; further caretakers are added via
    /// `link_caretaker` by someone already linked.
    #[instrument(skip(self, visual_pin), fields(code = enrollment_code))]
    pub fn register_student(
        &self,
        name: &str,
        enrollment_code: &str,
        visual_pin: Vec<String>,
        caretakers: Vec<UserId>,
    ) -> Result<StudentIdentity> {
        if enrollment_code.trim().is_empty() {
            return Err(AuthError::Invalid("enrollment code must not be empty".into()));
        }
        if visual_pin.is_empty() {
            return Err(AuthError::Invalid("PIN sequence must not be empty".into()));
        }

        let student = StudentIdentity::new(name, enrollment_code, visual_pin, caretakers);
        self.identities()?.insert(&student)?;
        info!(student_id = %student.id, "student registered");
        Ok(student)
    }

    /// Link an additional caretaker to a student. Requires the requester to
    /// already be linked. Idempotent: re-linking an existing caretaker is a
    /// no-op success.
    pub fn link_caretaker(
        &self,
        student_id: &StudentId,
        requester: &Caretaker,
        user: &UserId,
    ) -> Result<()> {
        self.require_linked(student_id, requester)?;
        self.identities()?.add_caretaker(student_id, user)
    }

    // -- Caretaker management ------------------------------------------------

    /// Replace a student's visual PIN.
    pub fn reset_pin(
        &self,
        student_id: &StudentId,
        requester: &Caretaker,
        new_pin: &[String],
    ) -> Result<()> {
        self.require_linked(student_id, requester)?;
        if new_pin.is_empty() {
            return Err(AuthError::Invalid("PIN sequence must not be empty".into()));
        }

        self.identities()?.update_pin(student_id, new_pin)?;
        audit::record_best_effort(
            &self.audit,
            AuditAction::PinReset,
            &actor(requester),
            student_id,
            &AuditDetail::PinReset {
                pin_len: new_pin.len(),
            },
        );
        Ok(())
    }

    /// Allow or forbid the face credential path for a student.
    pub fn toggle_face_auth(
        &self,
        student_id: &StudentId,
        requester: &Caretaker,
        enabled: bool,
    ) -> Result<()> {
        self.require_linked(student_id, requester)?;
        self.identities()?.set_face_auth_enabled(student_id, enabled)?;
        audit::record_best_effort(
            &self.audit,
            AuditAction::FaceAuthToggled,
            &actor(requester),
            student_id,
            &AuditDetail::FaceAuthToggled { enabled },
        );
        Ok(())
    }

    /// Activate or deactivate a student account.
    pub fn toggle_active(
        &self,
        student_id: &StudentId,
        requester: &Caretaker,
        active: bool,
    ) -> Result<()> {
        self.require_linked(student_id, requester)?;
        self.identities()?.set_active(student_id, active)?;

        let action = if active {
            AuditAction::AccountActivated
        } else {
            AuditAction::AccountDeactivated
        };
        audit::record_best_effort(
            &self.audit,
            action,
            &actor(requester),
            student_id,
            &AuditDetail::ActiveToggled { active },
        );
        Ok(())
    }

    // -- Audit trail ---------------------------------------------------------

    /// Audit entries for one student, oldest first.
    pub fn audit_entries_for_student(&self, student_id: &StudentId) -> Result<Vec<AuditEntry>> {
        self.audit
            .lock()
            .map_err(|_| AuthError::Database("audit trail mutex poisoned".into()))?
            .entries_for_student(student_id)
    }

    /// Most recent audit entries across all students.
    pub fn recent_audit_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        self.audit
            .lock()
            .map_err(|_| AuthError::Database("audit trail mutex poisoned".into()))?
            .recent_entries(limit)
    }

    /// Total number of audit entries.
    pub fn audit_count(&self) -> Result<u64> {
        self.audit
            .lock()
            .map_err(|_| AuthError::Database("audit trail mutex poisoned".into()))?
            .count()
    }

    // -- Internal ------------------------------------------------------------

    fn identities(&self) -> Result<std::sync::MutexGuard<'_, IdentityStore>> {
        self.identities
            .lock()
            .map_err(|_| AuthError::Database("identity store mutex poisoned".into()))
    }

    /// Resolve the student and verify the requester is a linked caretaker.
    fn require_linked(
        &self,
        student_id: &StudentId,
        requester: &Caretaker,
    ) -> Result<StudentIdentity> {
        let student = self
            .identities()?
            .get_by_id(student_id)?
            .ok_or(AuthError::NotFound)?;
        if !student.is_linked(&requester.user_id) {
            return Err(AuthError::NotLinked);
        }
        Ok(student)
    }
}

fn actor(requester: &Caretaker) -> AuditActor {
    AuditActor::User {
        user_id: requester.user_id,
        role: requester.role,
    }
}
