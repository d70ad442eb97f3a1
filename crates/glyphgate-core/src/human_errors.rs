// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for young and cognitively-diverse users.
//
// Every technical rejection maps to plain English with a clear suggestion.
// Credential mismatches and unknown codes share one deliberately vague
// message (to resist account enumeration); lock and rate-limit messages
// state the concrete wait, since that helps a legitimate user without
// helping an attacker differently.

use crate::error::AuthError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Temporary — waiting and retrying will help.
    Transient,
    /// A caretaker (teacher or parent) must do something first.
    ActionRequired,
    /// Cannot be fixed by retrying — the request itself is wrong.
    Permanent,
}

/// A plain-language error with an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether trying again later can succeed without outside help.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert an `AuthError` into a `HumanError` a young student can follow.
pub fn humanize_error(err: &AuthError) -> HumanError {
    match err {
        // Same message for an unknown code and a wrong credential — the
        // response must not reveal whether the code exists.
        AuthError::NotFound | AuthError::CredentialMismatch => HumanError {
            message: "That didn't work.".into(),
            suggestion: "Check your code and try your symbols again, slowly.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        AuthError::AccountDisabled => HumanError {
            message: "This account is switched off.".into(),
            suggestion: "Ask your teacher or parent to switch it back on.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        AuthError::FaceAuthDisabled => HumanError {
            message: "Face login isn't set up for you.".into(),
            suggestion: "Use your symbol code instead, or ask a grown-up to set up face login.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        AuthError::RateLimited => HumanError {
            message: "Too many tries.".into(),
            suggestion: "Take a short break and try again in a few minutes.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        AuthError::Locked { minutes } => HumanError {
            message: "Logins are paused for now.".into(),
            suggestion: format!("Please wait {minutes} minute(s) and try again."),
            retriable: true,
            severity: Severity::Transient,
        },

        AuthError::SessionNotFound => HumanError {
            message: "We couldn't find that enrollment link.".into(),
            suggestion: "Ask your teacher or parent to start the face setup again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        AuthError::SessionExpired => HumanError {
            message: "That enrollment link has run out of time.".into(),
            suggestion: "Ask your teacher or parent to start the face setup again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        AuthError::SessionConsumed => HumanError {
            message: "That enrollment link was already used.".into(),
            suggestion: "If face login isn't working, ask a grown-up to set it up again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        AuthError::NotLinked => HumanError {
            message: "You're not linked to this student.".into(),
            suggestion: "Ask a linked teacher or parent to add you first.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        AuthError::Invalid(detail) => HumanError {
            message: "Something about that request wasn't right.".into(),
            suggestion: format!("Please try again. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        AuthError::TokenInvalid | AuthError::TokenExpired => HumanError {
            message: "Your session has ended.".into(),
            suggestion: "Log in again to keep going.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        AuthError::Database(_) | AuthError::Signing(_) | AuthError::Io(_)
        | AuthError::Serialization(_) => HumanError {
            message: "Something went wrong on our side.".into(),
            suggestion: "Please try again in a moment.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}
