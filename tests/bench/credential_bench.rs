// Performance benchmarks for password hashing and session tokens

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use secrecy::SecretString;
use std::time::Duration;
use storefront_identity::core::credentials::{CredentialCodec, KdfParams};
use storefront_identity::core::tokens::TokenIssuer;
use uuid::Uuid;

fn bench_password_hashing(c: &mut Criterion) {
    let codec = CredentialCodec::new(KdfParams::default()).unwrap();

    let mut group = c.benchmark_group("credentials");
    group.sample_size(10);
    group.bench_function("hash_password", |b| {
        b.iter(|| codec.hash_password(black_box("correct-horse"), None).unwrap());
    });

    let digest = codec.hash_password("correct-horse", None).unwrap();
    group.bench_function("compare_hash_passwords", |b| {
        b.iter(|| {
            codec
                .compare_hash_passwords(black_box("correct-horse"), &digest.hash, &digest.salt)
                .unwrap()
        });
    });
    group.finish();
}

fn bench_session_tokens(c: &mut Criterion) {
    let issuer = TokenIssuer::new(
        &SecretString::new("bench-secret-that-is-at-least-32-bytes".to_string()),
        Duration::from_secs(3600),
    );
    let account_id = Uuid::new_v4();
    let issued = issuer.issue(account_id).unwrap();

    c.bench_function("token_issue", |b| {
        b.iter(|| issuer.issue(black_box(account_id)).unwrap());
    });
    c.bench_function("token_verify", |b| {
        b.iter(|| issuer.verify(black_box(&issued.token)).unwrap());
    });
}

criterion_group!(benches, bench_password_hashing, bench_session_tokens);
criterion_main!(benches);
