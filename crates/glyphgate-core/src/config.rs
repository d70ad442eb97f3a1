// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Authentication configuration.
//
// All tunable literals (similarity threshold, attempt caps, lock and
// expiry windows) live here so that deployments can adjust them without
// code changes.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Tunable parameters for the authentication subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Minimum cosine similarity for a face probe to be accepted.
    pub similarity_threshold: f32,
    /// Consecutive failures before an identity is locked.
    pub max_failed_attempts: u32,
    /// How long a triggered lock lasts, in seconds.
    pub lock_duration_secs: u64,
    /// Rate-limit window applied to entered enrollment codes, in seconds.
    pub rate_limit_window_secs: u64,
    /// Maximum login attempts per code within the rate-limit window.
    pub rate_limit_max_attempts: u32,
    /// Lifetime of an enrollment-session token, in seconds.
    pub enrollment_ttl_secs: u64,
    /// Lifetime of an issued student session token, in seconds.
    pub session_token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.72,
            max_failed_attempts: 5,
            lock_duration_secs: 5 * 60,
            rate_limit_window_secs: 5 * 60,
            rate_limit_max_attempts: 5,
            enrollment_ttl_secs: 10 * 60,
            session_token_ttl_secs: 2 * 60 * 60,
        }
    }
}

impl AuthConfig {
    pub fn lock_duration(&self) -> Duration {
        Duration::seconds(self.lock_duration_secs as i64)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::seconds(self.rate_limit_window_secs as i64)
    }

    pub fn enrollment_ttl(&self) -> Duration {
        Duration::seconds(self.enrollment_ttl_secs as i64)
    }

    pub fn session_token_ttl(&self) -> Duration {
        Duration::seconds(self.session_token_ttl_secs as i64)
    }
}
