// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Biometric verification — cosine similarity against a configured threshold.
//
// The embedding itself comes from an out-of-scope perception pipeline; this
// module treats it as an opaque comparable vector. Probe vectors are never
// persisted, and log fields carry the score, never the vectors.

use tracing::debug;

use glyphgate_core::error::{AuthError, Result};

/// Cosine similarity of two equal-length vectors:
/// `dot(a, b) / (|a| * |b|)`, in `[-1.0, 1.0]`.
///
/// Accumulates in f64 to keep the result stable at typical embedding sizes
/// (128–512 dims). Mismatched lengths and zero-magnitude vectors are
/// malformed input, not a credential mismatch.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(AuthError::Invalid(format!(
            "embedding length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    if a.is_empty() {
        return Err(AuthError::Invalid("embedding must not be empty".into()));
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += f64::from(x) * f64::from(y);
        norm_a += f64::from(x) * f64::from(x);
        norm_b += f64::from(y) * f64::from(y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(AuthError::Invalid("zero-magnitude embedding".into()));
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}

/// Threshold comparison over stored and probe embeddings.
pub struct BiometricVerifier {
    threshold: f32,
}

impl BiometricVerifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// `true` iff the probe scores at or above the threshold against the
    /// stored embedding.
    pub fn compare(&self, stored: &[f32], probe: &[f32]) -> Result<bool> {
        let score = cosine_similarity(stored, probe)?;
        debug!(
            score,
            threshold = self.threshold,
            dims = stored.len(),
            "face probe scored"
        );
        Ok(score >= self.threshold)
    }
}
