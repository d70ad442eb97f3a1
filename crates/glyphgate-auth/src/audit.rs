// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail — append-only SQLite log of every privileged mutation.
//
// Schema:
//   audit_log(
//     id         INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp  TEXT NOT NULL,   -- RFC 3339
//     action     TEXT NOT NULL,   -- canonical action tag
//     actor      TEXT NOT NULL,   -- JSON: caretaker {user_id, role} or "system"
//     student_id TEXT NOT NULL,
//     detail     TEXT NOT NULL    -- JSON: structured per-action payload
//   )
//
// Auditing must never degrade the primary flow: callers go through
// `record_best_effort`, which logs and swallows any underlying failure.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use glyphgate_core::error::{AuthError, Result};
use glyphgate_core::types::{CaretakerRole, StudentId, UserId};

/// Convert a `rusqlite::Error` into an `AuthError::Database`.
fn db_err(e: rusqlite::Error) -> AuthError {
    AuthError::Database(e.to_string())
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Canonical set of audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    SessionFaceEnrolled,
    LoginLockTriggered,
    PinReset,
    FaceAuthToggled,
    AccountActivated,
    AccountDeactivated,
}

impl AuditAction {
    /// Stable wire tag, shared with the audit consumers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionFaceEnrolled => "SESSION_FACE_ENROLLED",
            Self::LoginLockTriggered => "LOGIN_LOCK_TRIGGERED",
            Self::PinReset => "PIN_RESET",
            Self::FaceAuthToggled => "FACE_AUTH_TOGGLED",
            Self::AccountActivated => "ACCOUNT_ACTIVATED",
            Self::AccountDeactivated => "ACCOUNT_DEACTIVATED",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "SESSION_FACE_ENROLLED" => Some(Self::SessionFaceEnrolled),
            "LOGIN_LOCK_TRIGGERED" => Some(Self::LoginLockTriggered),
            "PIN_RESET" => Some(Self::PinReset),
            "FACE_AUTH_TOGGLED" => Some(Self::FaceAuthToggled),
            "ACCOUNT_ACTIVATED" => Some(Self::AccountActivated),
            "ACCOUNT_DEACTIVATED" => Some(Self::AccountDeactivated),
            _ => None,
        }
    }
}

/// Who performed the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditActor {
    User { user_id: UserId, role: CaretakerRole },
    System,
}

/// Structured per-action payload, with an opaque key-value fallback for
/// genuinely variable extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditDetail {
    FaceEnrolled { embedding_dims: usize },
    LockTriggered { until: DateTime<Utc>, threshold: u32 },
    PinReset { pin_len: usize },
    FaceAuthToggled { enabled: bool },
    ActiveToggled { active: bool },
    Extra { fields: BTreeMap<String, String> },
}

/// A single entry in the audit log, used for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub actor: AuditActor,
    pub student_id: StudentId,
    pub detail: AuditDetail,
}

/// Append-only audit log backed by a SQLite database.
pub struct AuditTrail {
    conn: Connection,
}

impl AuditTrail {
    /// Open (or create) the audit database at `path`.
    ///
    /// The `audit_log` table is created automatically if it does not already
    /// exist. WAL mode is enabled for better concurrent-read performance.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;
        debug!("audit trail opened");
        Ok(Self { conn })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;
        debug!("in-memory audit trail opened");
        Ok(Self { conn })
    }

    /// Append a new audit entry.
    #[instrument(skip(self, actor, detail), fields(action = action.as_str(), student_id = %student_id))]
    pub fn record(
        &self,
        action: AuditAction,
        actor: &AuditActor,
        student_id: &StudentId,
        detail: &AuditDetail,
    ) -> Result<()> {
        let actor_json = serde_json::to_string(actor)?;
        let detail_json = serde_json::to_string(detail)?;

        self.conn
            .execute(
                "INSERT INTO audit_log (timestamp, action, actor, student_id, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Utc::now().to_rfc3339(),
                    action.as_str(),
                    actor_json,
                    student_id.to_string(),
                    detail_json,
                ],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(())
    }

    /// Retrieve all entries for a student, oldest first.
    pub fn entries_for_student(&self, student_id: &StudentId) -> Result<Vec<AuditEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, timestamp, action, actor, student_id, detail
                 FROM audit_log WHERE student_id = ?1 ORDER BY id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![student_id.to_string()], row_to_entry)
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    /// Retrieve the most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, timestamp, action, actor, student_id, detail
                 FROM audit_log ORDER BY id DESC LIMIT ?1",
            )
            .map_err(db_err)?;

        let rows = stmt.query_map(params![limit], row_to_entry).map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    /// Return the total number of entries in the audit log.
    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(db_err)
    }
}

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS audit_log (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp  TEXT NOT NULL,
        action     TEXT NOT NULL,
        actor      TEXT NOT NULL,
        student_id TEXT NOT NULL,
        detail     TEXT NOT NULL
    );";

/// Append an audit entry, swallowing any failure.
///
/// The primary flow must stay available when the audit store is not; a
/// failed write (or a poisoned mutex) is reported at `warn!` and dropped.
pub fn record_best_effort(
    trail: &Mutex<AuditTrail>,
    action: AuditAction,
    actor: &AuditActor,
    student_id: &StudentId,
    detail: &AuditDetail,
) {
    match trail.lock() {
        Ok(trail) => {
            if let Err(e) = trail.record(action, actor, student_id, detail) {
                warn!(error = %e, action = action.as_str(), "audit write failed, entry dropped");
            }
        }
        Err(_) => {
            warn!(action = action.as_str(), "audit trail mutex poisoned, entry dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let id: i64 = row.get(0)?;
    let timestamp_str: String = row.get(1)?;
    let action_str: String = row.get(2)?;
    let actor_json: String = row.get(3)?;
    let student_id_str: String = row.get(4)?;
    let detail_json: String = row.get(5)?;

    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let action = AuditAction::from_tag(&action_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown audit action tag: {action_str}").into(),
        )
    })?;

    let actor: AuditActor = serde_json::from_str(&actor_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let student_uuid = uuid::Uuid::parse_str(&student_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let detail: AuditDetail = serde_json::from_str(&detail_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(AuditEntry {
        id,
        timestamp,
        action,
        actor,
        student_id: StudentId(student_uuid),
        detail,
    })
}
