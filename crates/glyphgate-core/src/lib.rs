// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Glyphgate — Core types and error definitions shared across all crates.

pub mod clock;
pub mod config;
pub mod error;
pub mod human_errors;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use error::AuthError;
pub use types::*;
