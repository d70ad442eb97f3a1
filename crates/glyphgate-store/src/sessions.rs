// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Enrollment session store backed by SQLite.
//
// Token consumption is the most race-sensitive operation in the system: it
// is a single compare-and-swap on the `used` flag, so duplicate or retried
// completion calls can capture at most one embedding per token.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info, instrument};

use glyphgate_core::error::Result;
use glyphgate_core::types::{EnrollmentSession, SessionId, StudentId};

use crate::{db_err, parse_ts, ts};

/// SQLite schema for the enrollment sessions table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS enrollment_sessions (
        id         TEXT PRIMARY KEY,
        student_id TEXT NOT NULL,
        token_hash TEXT NOT NULL UNIQUE,
        expires_at TEXT NOT NULL,
        used       INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
"#;

/// Outcome of attempting to consume an enrollment token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The CAS succeeded; the caller now owns the single biometric write.
    Consumed(StudentId),
    NotFound,
    Expired,
    AlreadyUsed,
}

/// Persistent enrollment session store.
pub struct EnrollmentStore {
    conn: Connection,
}

impl EnrollmentStore {
    /// Open (or create) the session database at the given path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;
        info!("enrollment session store opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;
        debug!("in-memory enrollment session store opened");
        Ok(Self { conn })
    }

    /// Persist a freshly issued session.
    #[instrument(skip(self, session), fields(session_id = %session.id, student_id = %session.student_id))]
    pub fn insert(&self, session: &EnrollmentSession) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO enrollment_sessions (id, student_id, token_hash, expires_at, used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session.id.to_string(),
                    session.student_id.to_string(),
                    session.token_hash,
                    ts(session.expires_at),
                    session.used,
                    ts(session.created_at),
                ],
            )
            .map_err(db_err)?;

        info!(session_id = %session.id, "enrollment session persisted");
        Ok(())
    }

    /// Read-only lookup by token hash. Returns `None` if absent.
    pub fn lookup(&self, token_hash: &str) -> Result<Option<EnrollmentSession>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, student_id, token_hash, expires_at, used, created_at
                 FROM enrollment_sessions WHERE token_hash = ?1",
            )
            .map_err(db_err)?;

        let mut rows = stmt
            .query_map(params![token_hash], row_to_session)
            .map_err(db_err)?;

        match rows.next() {
            Some(Ok(session)) => Ok(Some(session)),
            Some(Err(e)) => Err(db_err(e)),
            None => Ok(None),
        }
    }

    /// Atomically consume the session: `used: false -> true`, only while
    /// unexpired. The guarded UPDATE is the compare-and-swap; losers fall
    /// through to a read purely to report the distinguished reason.
    #[instrument(skip(self, token_hash))]
    pub fn consume(&self, token_hash: &str, now: DateTime<Utc>) -> Result<ConsumeOutcome> {
        let swapped = self
            .conn
            .execute(
                "UPDATE enrollment_sessions SET used = 1
                 WHERE token_hash = ?1 AND used = 0 AND expires_at > ?2",
                params![token_hash, ts(now)],
            )
            .map_err(db_err)?;

        if swapped == 1 {
            let student_id: String = self
                .conn
                .query_row(
                    "SELECT student_id FROM enrollment_sessions WHERE token_hash = ?1",
                    params![token_hash],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            let uuid = uuid::Uuid::parse_str(&student_id)
                .map_err(|e| glyphgate_core::AuthError::Database(e.to_string()))?;
            info!("enrollment session consumed");
            return Ok(ConsumeOutcome::Consumed(StudentId(uuid)));
        }

        // CAS failed — classify why for the caller's error taxonomy.
        match self.lookup(token_hash)? {
            None => Ok(ConsumeOutcome::NotFound),
            Some(session) if session.used => Ok(ConsumeOutcome::AlreadyUsed),
            Some(_) => Ok(ConsumeOutcome::Expired),
        }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<EnrollmentSession> {
    let id_str: String = row.get(0)?;
    let student_id_str: String = row.get(1)?;
    let token_hash: String = row.get(2)?;
    let expires_at_str: String = row.get(3)?;
    let used: bool = row.get(4)?;
    let created_at_str: String = row.get(5)?;

    let id = uuid::Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let student_id = uuid::Uuid::parse_str(&student_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(EnrollmentSession {
        id: SessionId(id),
        student_id: StudentId(student_id),
        token_hash,
        expires_at: parse_ts(3, &expires_at_str)?,
        used,
        created_at: parse_ts(5, &created_at_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_expiring_in(minutes: i64) -> EnrollmentSession {
        EnrollmentSession::new(
            StudentId::new(),
            "a".repeat(64),
            Utc::now() + Duration::minutes(minutes),
        )
    }

    #[test]
    fn insert_and_lookup() {
        let store = EnrollmentStore::open_in_memory().expect("open in-memory db");
        let session = session_expiring_in(10);
        store.insert(&session).expect("insert");

        let found = store
            .lookup(&session.token_hash)
            .expect("lookup")
            .expect("found");
        assert_eq!(found.id, session.id);
        assert_eq!(found.student_id, session.student_id);
        assert!(!found.used);
    }

    #[test]
    fn token_hash_is_unique() {
        let store = EnrollmentStore::open_in_memory().expect("open in-memory db");
        store.insert(&session_expiring_in(10)).expect("insert");
        let result = store.insert(&session_expiring_in(10));
        assert!(result.is_err());
    }

    #[test]
    fn consume_succeeds_once() {
        let store = EnrollmentStore::open_in_memory().expect("open in-memory db");
        let session = session_expiring_in(10);
        store.insert(&session).expect("insert");
        let now = Utc::now();

        let first = store.consume(&session.token_hash, now).expect("consume");
        assert_eq!(first, ConsumeOutcome::Consumed(session.student_id));

        let second = store.consume(&session.token_hash, now).expect("consume");
        assert_eq!(second, ConsumeOutcome::AlreadyUsed);
    }

    #[test]
    fn expired_session_cannot_be_consumed() {
        let store = EnrollmentStore::open_in_memory().expect("open in-memory db");
        let session = session_expiring_in(10);
        store.insert(&session).expect("insert");

        // Eleven minutes later the ten-minute session has expired.
        let later = Utc::now() + Duration::minutes(11);
        let outcome = store.consume(&session.token_hash, later).expect("consume");
        assert_eq!(outcome, ConsumeOutcome::Expired);

        // Still marked unused — expiry is not consumption.
        let found = store.lookup(&session.token_hash).unwrap().unwrap();
        assert!(!found.used);
    }

    #[test]
    fn unknown_token_reports_not_found() {
        let store = EnrollmentStore::open_in_memory().expect("open in-memory db");
        let outcome = store.consume(&"f".repeat(64), Utc::now()).expect("consume");
        assert_eq!(outcome, ConsumeOutcome::NotFound);
    }
}
