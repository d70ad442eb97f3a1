// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for biometric comparison, session token signing,
// and audit recording in the glyphgate-auth crate.

use chrono::Utc;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use glyphgate_auth::{
    AuditAction, AuditActor, AuditDetail, AuditTrail, SessionClaims, TokenSigner,
    cosine_similarity,
};
use glyphgate_core::types::StudentId;

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Benchmark cosine similarity at typical embedding dimensionalities.
///
/// Dims: 128, 256, 512 -- covering the common face-recognition model output
/// sizes. The comparison is the hot path of every face login.
fn bench_cosine_similarity(c: &mut Criterion) {
    let dims: &[usize] = &[128, 256, 512];

    let mut group = c.benchmark_group("cosine_similarity");
    for &dim in dims {
        let a: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.37).sin()).collect();
        let b: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.41).cos()).collect();
        group.bench_function(format!("{dim} dims"), |bench| {
            bench.iter(|| {
                let score = cosine_similarity(black_box(&a), black_box(&b))
                    .expect("similarity failed");
                black_box(score);
            });
        });
    }
    group.finish();
}

/// Benchmark a full HMAC token issue-then-verify round trip.
///
/// This exercises JSON claims serialization, HMAC-SHA256 signing, hex
/// encoding, and the corresponding verification path.
fn bench_token_roundtrip(c: &mut Criterion) {
    let signer = TokenSigner::new(b"benchmark-secret-key");
    let now = Utc::now();
    let claims = SessionClaims {
        sub: StudentId::new(),
        code: "DX-20250007".into(),
        role: "student".into(),
        iat: now.timestamp(),
        exp: now.timestamp() + 7200,
    };

    c.bench_function("token_issue_verify_roundtrip", |b| {
        b.iter(|| {
            let token = signer.issue(black_box(&claims)).expect("issue failed");
            let verified = signer.verify(&token, now).expect("verify failed");
            black_box(verified);
        });
    });
}

/// Benchmark recording an audit entry to an in-memory SQLite database.
///
/// Each iteration inserts a single record into a database created outside
/// the hot loop, so this measures steady-state per-record overhead.
fn bench_audit_record(c: &mut Criterion) {
    c.bench_function("audit_record (in-memory SQLite)", |b| {
        let trail = AuditTrail::open_in_memory().expect("open in-memory audit trail");
        let student_id = StudentId::new();
        let detail = AuditDetail::FaceEnrolled { embedding_dims: 128 };

        b.iter(|| {
            trail
                .record(
                    black_box(AuditAction::SessionFaceEnrolled),
                    black_box(&AuditActor::System),
                    black_box(&student_id),
                    black_box(&detail),
                )
                .expect("record failed");
        });
    });
}

criterion_group!(
    benches,
    bench_cosine_similarity,
    bench_token_roundtrip,
    bench_audit_record,
);
criterion_main!(benches);
