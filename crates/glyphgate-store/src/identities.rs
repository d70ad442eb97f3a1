// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Student identity store backed by SQLite.
//
// Besides plain reads and caretaker-driven updates, this store owns the
// failure-counter state machine primitive: `record_failure` is a pair of
// guarded UPDATEs so that two concurrent wrong-credential submissions can
// never both cross the lock threshold — at most one observes the trigger.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info, instrument};

use glyphgate_core::error::{AuthError, Result};
use glyphgate_core::types::{StudentId, StudentIdentity, UserId};

use crate::{db_err, parse_ts, ts};

/// SQLite schema for the students table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS students (
        id                TEXT PRIMARY KEY,
        name              TEXT NOT NULL,
        enrollment_code   TEXT NOT NULL UNIQUE,
        visual_pin        TEXT NOT NULL DEFAULT '[]',
        face_embedding    TEXT,
        face_auth_enabled INTEGER NOT NULL DEFAULT 0,
        is_active         INTEGER NOT NULL DEFAULT 1,
        failed_attempts   INTEGER NOT NULL DEFAULT 0,
        lock_until        TEXT,
        caretakers        TEXT NOT NULL DEFAULT '[]',
        created_at        TEXT NOT NULL,
        updated_at        TEXT NOT NULL
    )
"#;

/// Outcome of recording a failed login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// A lock was already active — the attempt was not counted and the
    /// lock was not extended.
    AlreadyLocked,
    /// The failure was counted; this is the new consecutive-failure count.
    Counted(u32),
    /// This failure crossed the threshold: the lock is now set and the
    /// counter reset. Exactly one writer observes this per lock.
    LockTriggered { until: DateTime<Utc> },
}

/// Persistent student identity store.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively. Callers share the store behind `Arc<Mutex<_>>`.
pub struct IdentityStore {
    conn: Connection,
}

impl IdentityStore {
    /// Open (or create) the identity database at the given path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;

        // WAL mode is better for concurrent readers and survives unclean
        // shutdowns more gracefully.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;

        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        info!("identity store opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;
        debug!("in-memory identity store opened");
        Ok(Self { conn })
    }

    /// Insert a new student identity.
    #[instrument(skip(self, student), fields(student_id = %student.id))]
    pub fn insert(&self, student: &StudentIdentity) -> Result<()> {
        let pin_json = serde_json::to_string(&student.visual_pin)?;
        let embedding_json = student
            .face_embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let caretakers_json = serde_json::to_string(&student.caretakers)?;

        self.conn
            .execute(
                "INSERT INTO students (id, name, enrollment_code, visual_pin, face_embedding,
                 face_auth_enabled, is_active, failed_attempts, lock_until, caretakers,
                 created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    student.id.to_string(),
                    student.name,
                    student.enrollment_code,
                    pin_json,
                    embedding_json,
                    student.face_auth_enabled,
                    student.is_active,
                    student.failed_attempts,
                    student.lock_until.map(ts),
                    caretakers_json,
                    ts(student.created_at),
                    ts(student.updated_at),
                ],
            )
            .map_err(db_err)?;

        info!(student_id = %student.id, "student inserted");
        Ok(())
    }

    /// Retrieve a student by id. Returns `None` if absent.
    pub fn get_by_id(&self, id: &StudentId) -> Result<Option<StudentIdentity>> {
        self.get_where("id = ?1", &id.to_string())
    }

    /// Retrieve a student by entered enrollment code. Returns `None` if absent.
    pub fn get_by_code(&self, enrollment_code: &str) -> Result<Option<StudentIdentity>> {
        self.get_where("enrollment_code = ?1", enrollment_code)
    }

    fn get_where(&self, predicate: &str, value: &str) -> Result<Option<StudentIdentity>> {
        let sql = format!(
            "SELECT id, name, enrollment_code, visual_pin, face_embedding,
                    face_auth_enabled, is_active, failed_attempts, lock_until,
                    caretakers, created_at, updated_at
             FROM students WHERE {predicate}"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let mut rows = stmt
            .query_map(params![value], row_to_identity)
            .map_err(db_err)?;

        match rows.next() {
            Some(Ok(student)) => Ok(Some(student)),
            Some(Err(e)) => Err(db_err(e)),
            None => Ok(None),
        }
    }

    /// Replace the visual PIN.
    #[instrument(skip(self, pin), fields(student_id = %id, pin_len = pin.len()))]
    pub fn update_pin(&self, id: &StudentId, pin: &[String]) -> Result<()> {
        let pin_json = serde_json::to_string(pin)?;
        self.update_one(
            "UPDATE students SET visual_pin = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), pin_json, ts(Utc::now())],
        )
    }

    /// Toggle whether the face credential path is allowed.
    #[instrument(skip(self), fields(student_id = %id, enabled))]
    pub fn set_face_auth_enabled(&self, id: &StudentId, enabled: bool) -> Result<()> {
        self.update_one(
            "UPDATE students SET face_auth_enabled = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), enabled, ts(Utc::now())],
        )
    }

    /// Activate or deactivate the account.
    #[instrument(skip(self), fields(student_id = %id, active))]
    pub fn set_active(&self, id: &StudentId, active: bool) -> Result<()> {
        self.update_one(
            "UPDATE students SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), active, ts(Utc::now())],
        )
    }

    /// Store a face embedding and enable the face credential path.
    ///
    /// Only called after an enrollment token has been consumed; the
    /// exactly-once guarantee lives in the session store's CAS, not here.
    #[instrument(skip(self, embedding), fields(student_id = %id, dims = embedding.len()))]
    pub fn write_embedding(&self, id: &StudentId, embedding: &[f32]) -> Result<()> {
        let embedding_json = serde_json::to_string(embedding)?;
        self.update_one(
            "UPDATE students SET face_embedding = ?2, face_auth_enabled = 1, updated_at = ?3
             WHERE id = ?1",
            params![id.to_string(), embedding_json, ts(Utc::now())],
        )
    }

    /// Link a caretaker to the student. Idempotent.
    #[instrument(skip(self), fields(student_id = %id, user_id = %user))]
    pub fn add_caretaker(&self, id: &StudentId, user: &UserId) -> Result<()> {
        let student = self.get_by_id(id)?.ok_or(AuthError::NotFound)?;
        if student.caretakers.contains(user) {
            return Ok(());
        }
        let mut caretakers = student.caretakers;
        caretakers.push(*user);
        let caretakers_json = serde_json::to_string(&caretakers)?;
        self.update_one(
            "UPDATE students SET caretakers = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), caretakers_json, ts(Utc::now())],
        )
    }

    /// Count a failed login attempt, triggering a lock at `threshold`.
    ///
    /// Two guarded UPDATEs, no read-then-write: the increment only applies
    /// while no lock is active, and the lock transition only applies while
    /// the counter still holds the value this writer observed. Under
    /// concurrent failures at the threshold, exactly one caller sees
    /// `LockTriggered`.
    #[instrument(skip(self), fields(student_id = %id))]
    pub fn record_failure(
        &self,
        id: &StudentId,
        now: DateTime<Utc>,
        threshold: u32,
        lock_duration: Duration,
    ) -> Result<FailureOutcome> {
        let counted = self
            .conn
            .execute(
                "UPDATE students SET failed_attempts = failed_attempts + 1, updated_at = ?2
                 WHERE id = ?1 AND (lock_until IS NULL OR lock_until <= ?3)",
                params![id.to_string(), ts(now), ts(now)],
            )
            .map_err(db_err)?;

        if counted == 0 {
            // Row missing, or a lock is active — locked attempts are not
            // counted and do not extend the lock.
            return match self.get_by_id(id)? {
                None => Err(AuthError::NotFound),
                Some(_) => Ok(FailureOutcome::AlreadyLocked),
            };
        }

        let attempts: u32 = self
            .conn
            .query_row(
                "SELECT failed_attempts FROM students WHERE id = ?1",
                params![id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .map_err(db_err)? as u32;

        if attempts >= threshold {
            let until = now + lock_duration;
            let locked = self
                .conn
                .execute(
                    "UPDATE students SET failed_attempts = 0, lock_until = ?2, updated_at = ?3
                     WHERE id = ?1 AND failed_attempts = ?4",
                    params![id.to_string(), ts(until), ts(now), attempts],
                )
                .map_err(db_err)?;

            if locked == 1 {
                info!(student_id = %id, until = %until, "failure threshold crossed, lock set");
                return Ok(FailureOutcome::LockTriggered { until });
            }
            // Another writer crossed the threshold between our two
            // statements; it owns the trigger.
        }

        debug!(student_id = %id, attempts, "failed attempt counted");
        Ok(FailureOutcome::Counted(attempts))
    }

    /// Reset the failure counter and clear any lock. Called on successful
    /// authentication via either credential path.
    #[instrument(skip(self), fields(student_id = %id))]
    pub fn clear_failures(&self, id: &StudentId) -> Result<()> {
        self.update_one(
            "UPDATE students SET failed_attempts = 0, lock_until = NULL, updated_at = ?2
             WHERE id = ?1",
            params![id.to_string(), ts(Utc::now())],
        )
    }

    /// Run an UPDATE that must touch exactly one row; `NotFound` otherwise.
    fn update_one(&self, sql: &str, params: impl rusqlite::Params) -> Result<()> {
        let rows = self.conn.execute(sql, params).map_err(db_err)?;
        if rows == 0 {
            return Err(AuthError::NotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map a SQLite row to a `StudentIdentity`.
///
/// Column indices must match the SELECT order in `get_where`.
fn row_to_identity(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentIdentity> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let enrollment_code: String = row.get(2)?;
    let pin_json: String = row.get(3)?;
    let embedding_json: Option<String> = row.get(4)?;
    let face_auth_enabled: bool = row.get(5)?;
    let is_active: bool = row.get(6)?;
    let failed_attempts: u32 = row.get::<_, i64>(7)? as u32;
    let lock_until_str: Option<String> = row.get(8)?;
    let caretakers_json: String = row.get(9)?;
    let created_at_str: String = row.get(10)?;
    let updated_at_str: String = row.get(11)?;

    let uuid = uuid::Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let visual_pin: Vec<String> = serde_json::from_str(&pin_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let face_embedding: Option<Vec<f32>> = match embedding_json {
        Some(json) => Some(serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };

    let lock_until = match lock_until_str {
        Some(raw) => Some(parse_ts(8, &raw)?),
        None => None,
    };

    let caretakers: Vec<UserId> = serde_json::from_str(&caretakers_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(StudentIdentity {
        id: StudentId(uuid),
        name,
        enrollment_code,
        visual_pin,
        face_embedding,
        face_auth_enabled,
        is_active,
        failed_attempts,
        lock_until,
        caretakers,
        created_at: parse_ts(10, &created_at_str)?,
        updated_at: parse_ts(11, &updated_at_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_student() -> StudentIdentity {
        StudentIdentity::new(
            "Mina",
            "DX-20250007",
            vec!["star".into(), "fire".into(), "drop".into(), "clover".into()],
            vec![UserId::new()],
        )
    }

    #[test]
    fn insert_and_retrieve_by_code() {
        let store = IdentityStore::open_in_memory().expect("open in-memory db");
        let student = test_student();
        store.insert(&student).expect("insert");

        let found = store
            .get_by_code("DX-20250007")
            .expect("get_by_code")
            .expect("found");
        assert_eq!(found.id, student.id);
        assert_eq!(found.visual_pin, student.visual_pin);
        assert_eq!(found.caretakers, student.caretakers);
        assert!(found.face_embedding.is_none());
    }

    #[test]
    fn enrollment_code_is_unique() {
        let store = IdentityStore::open_in_memory().expect("open in-memory db");
        store.insert(&test_student()).expect("insert first");
        let result = store.insert(&test_student());
        assert!(result.is_err());
    }

    #[test]
    fn unknown_code_returns_none() {
        let store = IdentityStore::open_in_memory().expect("open in-memory db");
        let found = store.get_by_code("DX-9999").expect("get_by_code");
        assert!(found.is_none());
    }

    #[test]
    fn failures_count_up_then_lock() {
        let store = IdentityStore::open_in_memory().expect("open in-memory db");
        let student = test_student();
        store.insert(&student).expect("insert");
        let now = Utc::now();

        for expected in 1..5u32 {
            let outcome = store
                .record_failure(&student.id, now, 5, Duration::minutes(5))
                .expect("record_failure");
            assert_eq!(outcome, FailureOutcome::Counted(expected));
        }

        let outcome = store
            .record_failure(&student.id, now, 5, Duration::minutes(5))
            .expect("record_failure");
        assert_eq!(
            outcome,
            FailureOutcome::LockTriggered {
                until: now + Duration::minutes(5)
            }
        );

        // Counter reset by the lock transition.
        let locked = store.get_by_id(&student.id).unwrap().unwrap();
        assert_eq!(locked.failed_attempts, 0);
        assert!(locked.lock_until.is_some());
    }

    #[test]
    fn locked_identity_ignores_further_failures() {
        let store = IdentityStore::open_in_memory().expect("open in-memory db");
        let student = test_student();
        store.insert(&student).expect("insert");
        let now = Utc::now();

        for _ in 0..5 {
            store
                .record_failure(&student.id, now, 5, Duration::minutes(5))
                .expect("record_failure");
        }
        let before = store.get_by_id(&student.id).unwrap().unwrap();

        let outcome = store
            .record_failure(&student.id, now, 5, Duration::minutes(5))
            .expect("record_failure");
        assert_eq!(outcome, FailureOutcome::AlreadyLocked);

        // Lock not extended, counter untouched.
        let after = store.get_by_id(&student.id).unwrap().unwrap();
        assert_eq!(after.lock_until, before.lock_until);
        assert_eq!(after.failed_attempts, 0);
    }

    #[test]
    fn expired_lock_counts_again() {
        let store = IdentityStore::open_in_memory().expect("open in-memory db");
        let student = test_student();
        store.insert(&student).expect("insert");
        let now = Utc::now();

        for _ in 0..5 {
            store
                .record_failure(&student.id, now, 5, Duration::minutes(5))
                .expect("record_failure");
        }

        // Six minutes later the lock has elapsed; failures count from zero.
        let later = now + Duration::minutes(6);
        let outcome = store
            .record_failure(&student.id, later, 5, Duration::minutes(5))
            .expect("record_failure");
        assert_eq!(outcome, FailureOutcome::Counted(1));
    }

    #[test]
    fn clear_failures_resets_everything() {
        let store = IdentityStore::open_in_memory().expect("open in-memory db");
        let student = test_student();
        store.insert(&student).expect("insert");
        let now = Utc::now();

        for _ in 0..3 {
            store
                .record_failure(&student.id, now, 5, Duration::minutes(5))
                .expect("record_failure");
        }
        store.clear_failures(&student.id).expect("clear");

        let cleared = store.get_by_id(&student.id).unwrap().unwrap();
        assert_eq!(cleared.failed_attempts, 0);
        assert!(cleared.lock_until.is_none());
    }

    #[test]
    fn record_failure_for_unknown_student_errors() {
        let store = IdentityStore::open_in_memory().expect("open in-memory db");
        let result = store.record_failure(&StudentId::new(), Utc::now(), 5, Duration::minutes(5));
        assert!(matches!(result, Err(AuthError::NotFound)));
    }

    #[test]
    fn write_embedding_enables_face_auth() {
        let store = IdentityStore::open_in_memory().expect("open in-memory db");
        let student = test_student();
        store.insert(&student).expect("insert");

        store
            .write_embedding(&student.id, &[0.1, 0.2, 0.3])
            .expect("write_embedding");

        let updated = store.get_by_id(&student.id).unwrap().unwrap();
        assert!(updated.face_auth_enabled);
        assert_eq!(updated.face_embedding.as_deref(), Some(&[0.1, 0.2, 0.3][..]));
    }

    #[test]
    fn add_caretaker_is_idempotent() {
        let store = IdentityStore::open_in_memory().expect("open in-memory db");
        let student = test_student();
        store.insert(&student).expect("insert");
        let parent = UserId::new();

        store.add_caretaker(&student.id, &parent).expect("link");
        store.add_caretaker(&student.id, &parent).expect("re-link");

        let updated = store.get_by_id(&student.id).unwrap().unwrap();
        assert_eq!(updated.caretakers.len(), 2);
    }

    #[test]
    fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("identities.db");
        let student = test_student();

        {
            let store = IdentityStore::open(&path).expect("open");
            store.insert(&student).expect("insert");
        }

        let store = IdentityStore::open(&path).expect("reopen");
        let found = store.get_by_id(&student.id).expect("get").expect("found");
        assert_eq!(found.enrollment_code, "DX-20250007");
    }
}
