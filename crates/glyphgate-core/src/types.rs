// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Glyphgate authentication service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub Uuid);

impl StudentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StudentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a caretaker account (teacher or parent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an enrollment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supervising role of a caretaker account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaretakerRole {
    Teacher,
    Parent,
}

/// A caretaker principal, resolved once at the service boundary.
///
/// Caretaker requests carry this instead of a loosely-shaped user object so
/// that downstream code has a uniform role discriminant to audit against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caretaker {
    pub user_id: UserId,
    pub role: CaretakerRole,
}

/// A student identity and its credential state.
///
/// Attempt/lock fields are mutated only by the authentication flow; the PIN,
/// embedding, and flags only by linked caretakers. Rows are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentIdentity {
    pub id: StudentId,
    pub name: String,
    /// Human-readable unique code entered at login (e.g. `DX-20250007`).
    pub enrollment_code: String,
    /// Ordered sequence of symbol tokens (e.g. `["star", "fire", "drop"]`).
    pub visual_pin: Vec<String>,
    /// Face embedding vector, present only once biometric enrollment has
    /// completed. Treated as an opaque comparable vector.
    pub face_embedding: Option<Vec<f32>>,
    pub face_auth_enabled: bool,
    pub is_active: bool,
    pub failed_attempts: u32,
    /// While set and in the future, all login attempts are rejected.
    pub lock_until: Option<DateTime<Utc>>,
    /// Caretakers (teachers/parents) allowed to manage this student.
    pub caretakers: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentIdentity {
    pub fn new(
        name: impl Into<String>,
        enrollment_code: impl Into<String>,
        visual_pin: Vec<String>,
        caretakers: Vec<UserId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: StudentId::new(),
            name: name.into(),
            enrollment_code: enrollment_code.into(),
            visual_pin,
            face_embedding: None,
            face_auth_enabled: false,
            is_active: true,
            failed_attempts: 0,
            lock_until: None,
            caretakers,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `user` is allowed to manage this student.
    pub fn is_linked(&self, user: &UserId) -> bool {
        self.caretakers.contains(user)
    }
}

/// Minimal identity projection returned on successful login.
///
/// Deliberately excludes the PIN, the embedding, and the attempt/lock state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: StudentId,
    pub name: String,
    pub enrollment_code: String,
    pub face_auth_enabled: bool,
    pub is_active: bool,
}

impl From<&StudentIdentity> for StudentProfile {
    fn from(s: &StudentIdentity) -> Self {
        Self {
            id: s.id,
            name: s.name.clone(),
            enrollment_code: s.enrollment_code.clone(),
            face_auth_enabled: s.face_auth_enabled,
            is_active: s.is_active,
        }
    }
}

/// A single-use, time-boxed authorization to capture one biometric sample.
///
/// Transitions unused -> used exactly once; never updated after consumption
/// or expiry. Only the SHA-256 of the opaque token is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentSession {
    pub id: SessionId,
    pub student_id: StudentId,
    /// SHA-256 hex digest of the caller-visible token.
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl EnrollmentSession {
    pub fn new(student_id: StudentId, token_hash: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            student_id,
            token_hash,
            expires_at,
            used: false,
            created_at: Utc::now(),
        }
    }
}
