// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// glyphgate-store — SQLite persistence for the authentication flow.
//
// Two document stores: student identities and enrollment sessions. Both use
// WAL mode and expose the conditional read-modify-write primitives the auth
// flow depends on (failure counting under a lock guard, single-shot token
// consumption) as guarded UPDATE statements, never as read-then-write.

pub mod identities;
pub mod sessions;

use chrono::{DateTime, SecondsFormat, Utc};
use glyphgate_core::error::AuthError;

// PUBLIC API: Re-export the stores and their outcome types
pub use identities::{FailureOutcome, IdentityStore};
pub use sessions::{ConsumeOutcome, EnrollmentStore};

/// Convert a `rusqlite::Error` into an `AuthError::Database`.
pub(crate) fn db_err(e: rusqlite::Error) -> AuthError {
    AuthError::Database(e.to_string())
}

/// Format a timestamp for storage.
///
/// Fixed-width RFC 3339 with microsecond precision and a `Z` suffix, so
/// that lexicographic comparison in SQL matches chronological order — the
/// expiry and lock guards in the UPDATE statements rely on this.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp stored by `ts`.
pub(crate) fn parse_ts(col: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn timestamp_ordering_survives_string_comparison() {
        let base = Utc::now();
        let earlier = ts(base);
        let later = ts(base + Duration::microseconds(1));
        assert!(earlier < later);

        let much_later = ts(base + Duration::minutes(10));
        assert!(earlier < much_later);
    }

    #[test]
    fn timestamp_round_trip() {
        let now = Utc::now();
        let parsed = parse_ts(0, &ts(now)).unwrap();
        // Microsecond precision is preserved; nanoseconds are truncated.
        assert!((now - parsed).num_microseconds().unwrap().abs() < 1);
    }
}
