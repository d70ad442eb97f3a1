// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Coarse per-identifier throttle in front of all login attempts.
//
// Keyed by the raw entered enrollment code, not the resolved identity, so
// unknown codes are throttled exactly like real ones and the rejection
// reveals nothing about whether the code exists.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use glyphgate_core::clock::Clock;
use glyphgate_core::config::AuthConfig;
use glyphgate_core::error::{AuthError, Result};

/// Counter store behind the rate limiter.
///
/// Injected so that a multi-instance deployment can plug in a shared
/// atomic increment-with-expiry backend; the in-memory implementation
/// below is only correct for a single process.
pub trait AttemptStore: Send + Sync {
    /// Record an attempt for `key` and return the attempt count within the
    /// current window. A window starts at the first attempt after the
    /// previous window elapsed.
    fn register(&self, key: &str, now: DateTime<Utc>, window: Duration) -> u32;
}

/// Process-local attempt store.
///
/// NOT suitable for multi-instance deployments: each process counts
/// independently, so the effective cap is multiplied by the instance count.
#[derive(Default)]
pub struct InMemoryAttemptStore {
    windows: Mutex<HashMap<String, WindowRecord>>,
}

struct WindowRecord {
    count: u32,
    window_start: DateTime<Utc>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttemptStore for InMemoryAttemptStore {
    fn register(&self, key: &str, now: DateTime<Utc>, window: Duration) -> u32 {
        let mut windows = self.windows.lock().expect("attempt store mutex");
        let record = windows
            .entry(key.to_string())
            .and_modify(|r| {
                if now - r.window_start > window {
                    // Previous window elapsed — start over.
                    r.count = 1;
                    r.window_start = now;
                } else {
                    r.count += 1;
                }
            })
            .or_insert(WindowRecord {
                count: 1,
                window_start: now,
            });
        record.count
    }
}

/// Fixed-window rate limiter over an injected attempt store.
pub struct RateLimiter {
    store: Arc<dyn AttemptStore>,
    max_attempts: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn AttemptStore>, config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            max_attempts: config.rate_limit_max_attempts,
            window: config.rate_limit_window(),
            clock,
        }
    }

    /// Record an attempt for the entered code; uniform `RateLimited`
    /// rejection once the window cap is exceeded.
    pub fn check(&self, entered_code: &str) -> Result<()> {
        let count = self
            .store
            .register(entered_code, self.clock.now(), self.window);
        if count > self.max_attempts {
            warn!(attempts = count, "rate limit exceeded for entered code");
            return Err(AuthError::RateLimited);
        }
        Ok(())
    }
}
