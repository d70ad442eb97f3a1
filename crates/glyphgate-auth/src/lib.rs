// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// glyphgate-auth — The authentication/session subsystem.
//
// Two credential paths (ordered visual PIN, face embedding) share one
// lockout state machine and one rate limiter; biometric capture is gated by
// single-use time-boxed enrollment sessions; every privileged mutation
// leaves a best-effort audit entry.

pub mod audit;
pub mod authenticator;
pub mod biometric;
pub mod enrollment;
pub mod gate;
pub mod lockout;
pub mod ratelimit;
pub mod token;

// PUBLIC API: Re-export the subsystem entry points
pub use audit::{AuditAction, AuditActor, AuditDetail, AuditEntry, AuditTrail};
pub use authenticator::{CredentialAuthenticator, LoginSuccess};
pub use biometric::{BiometricVerifier, cosine_similarity};
pub use enrollment::{EnrollmentSessionManager, IssuedSession, hash_token};
pub use gate::{AuthorizationGate, LoginPath};
pub use lockout::LockoutGuard;
pub use ratelimit::{AttemptStore, InMemoryAttemptStore, RateLimiter};
pub use token::{SessionClaims, TokenSigner, generate_enrollment_token};
