//! Benchmarks for per-request hot paths: ticket verification, principal
//! construction and in-interval stamp validation

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use warden_auth_core::{
    ClaimsPrincipalBuilder, SecurityStampValidator, TicketProtector, UserLocks,
};
use warden_store::MemoryStore;
use warden_types::{Claim, SecurityStamp, Session, UserId};

fn session_with_claims(count: usize) -> Session {
    let claims = (0..count)
        .map(|i| Claim::new("role", format!("role_{i}")))
        .collect();
    Session::new(
        UserId::new(),
        SecurityStamp::generate(),
        "Identity.Application",
        claims,
        Utc::now(),
    )
}

fn bench_ticket(c: &mut Criterion) {
    let protector =
        TicketProtector::new("benchmark-ticket-secret-of-32-bytes", Duration::from_secs(3600))
            .unwrap();
    let mut group = c.benchmark_group("ticket");

    for count in [0, 5, 20] {
        let session = session_with_claims(count);
        let ticket = protector.protect(&session).unwrap();

        group.bench_with_input(BenchmarkId::new("protect", count), &session, |b, session| {
            b.iter(|| protector.protect(black_box(session)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("unprotect", count), &ticket, |b, ticket| {
            b.iter(|| protector.unprotect(black_box(ticket)).unwrap());
        });
    }

    group.finish();
}

fn bench_principal(c: &mut Criterion) {
    let builder = ClaimsPrincipalBuilder::new();
    let session = session_with_claims(10);

    c.bench_function("principal_for_session", |b| {
        b.iter(|| builder.principal_for_session(black_box(&session)));
    });
}

fn bench_validation_within_interval(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let validator = SecurityStampValidator::new(
        Arc::new(MemoryStore::new()),
        Duration::from_secs(30 * 60),
        UserLocks::new(),
        ClaimsPrincipalBuilder::new(),
    );
    let mut session = session_with_claims(5);

    c.bench_function("validate_within_interval", |b| {
        b.iter(|| {
            runtime
                .block_on(validator.validate(black_box(&mut session)))
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_ticket,
    bench_principal,
    bench_validation_within_interval
);
criterion_main!(benches);
