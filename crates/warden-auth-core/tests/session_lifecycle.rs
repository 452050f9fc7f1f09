//! End-to-end sign-in, validation and ticket tests against the service

mod common;

use chrono::Duration as ChronoDuration;
use common::{
    fast_hasher, register, service, test_config, CountingHasher, CountingStore, FailingStore,
    PASSWORD,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use warden_auth_core::{
    service::default_registry, AuthError, AuthService, AuthStateChange, AuthorizationPolicy,
    SignInResult, StampValidation,
};
use warden_store::{CredentialStore, MemoryStore};
use warden_types::{Claim, SecurityStamp, UserId};

#[tokio::test]
async fn password_change_invalidates_existing_sessions_at_next_check() {
    common::init_tracing();
    let store = Arc::new(MemoryStore::new());
    let service = service(store.clone());
    register(service.accounts(), "alice").await;

    let SignInResult::Success(user) = service.authenticate("alice", PASSWORD).await.unwrap() else {
        panic!("expected success");
    };
    let mut session = service.establish_session(&user);

    service
        .accounts()
        .change_password(user.id, PASSWORD, "N3wPassw0rd!")
        .await
        .unwrap();

    // Still inside the interval: the stale stamp is not noticed yet
    let soon = session.last_validated + ChronoDuration::minutes(10);
    let result = service.validator().validate_at(&mut session, soon).await.unwrap();
    assert_eq!(result, StampValidation::Valid);

    let later = session.last_validated + ChronoDuration::minutes(30);
    let result = service.validator().validate_at(&mut session, later).await.unwrap();
    assert_eq!(result, StampValidation::Invalidated);

    // The new password signs in and the new session validates
    let outcome = service.authenticate("alice", "N3wPassw0rd!").await.unwrap();
    let mut fresh = service.establish_session(outcome.user().unwrap());
    let tick = fresh.last_validated + ChronoDuration::minutes(31);
    assert!(service
        .validator()
        .validate_at(&mut fresh, tick)
        .await
        .unwrap()
        .is_valid());
    assert_eq!(fresh.user_id, user.id);
}

#[tokio::test]
async fn validation_inside_interval_never_reads_the_store() {
    let store = Arc::new(CountingStore::new());
    let service = service(store.clone());
    let user = register(service.accounts(), "bob").await;
    let mut session = service.establish_session(&user);
    store.reset();

    for minutes in [0, 5, 15, 29] {
        let now = session.last_validated + ChronoDuration::minutes(minutes);
        let result = service.validator().validate_at(&mut session, now).await.unwrap();
        assert!(result.is_valid());
    }
    assert_eq!(store.reads(), 0);

    let now = session.last_validated + ChronoDuration::minutes(30);
    service.validator().validate_at(&mut session, now).await.unwrap();
    assert!(store.reads() > 0);
}

#[tokio::test]
async fn invalidated_session_stays_invalidated_without_store_reads() {
    let store = Arc::new(CountingStore::new());
    let service = service(store.clone());
    let user = register(service.accounts(), "bea").await;
    let mut session = service.establish_session(&user);
    service.accounts().update_security_stamp(user.id).await.unwrap();

    let notices = Arc::new(AtomicUsize::new(0));
    let counter = notices.clone();
    service.subscribe(move |change: &AuthStateChange| {
        if change.kind() == "session_invalidated" {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let now = session.last_validated + ChronoDuration::minutes(30);
    let result = service.validator().validate_at(&mut session, now).await.unwrap();
    assert_eq!(result, StampValidation::Invalidated);

    store.reset();
    let later = now + ChronoDuration::minutes(30);
    let result = service.validator().validate_at(&mut session, later).await.unwrap();
    assert_eq!(result, StampValidation::Invalidated);
    assert_eq!(store.reads(), 0);
    assert_eq!(notices.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stamp_rotation_scenario() {
    let store = Arc::new(MemoryStore::new());
    let service = service(store.clone());
    let user = register(service.accounts(), "carol").await;
    store
        .update_security_stamp(user.id, SecurityStamp::from_string("S1"))
        .await
        .unwrap();
    let user = store.get_user_by_id(user.id).await.unwrap().unwrap();

    // t = 0: sign in with S1
    let mut session = service.establish_session(&user);
    let t0 = session.last_validated;

    // t = 10m: stamp moves to S2; t = 20m: still valid
    store
        .update_security_stamp(user.id, SecurityStamp::from_string("S2"))
        .await
        .unwrap();
    let result = service
        .validator()
        .validate_at(&mut session, t0 + ChronoDuration::minutes(20))
        .await
        .unwrap();
    assert_eq!(result, StampValidation::Valid);

    // t = 30m: interval elapsed, S1 != S2
    let result = service
        .validator()
        .validate_at(&mut session, t0 + ChronoDuration::minutes(30))
        .await
        .unwrap();
    assert_eq!(result, StampValidation::Invalidated);
}

#[tokio::test]
async fn principal_is_authenticated_iff_type_present() {
    let service = service(Arc::new(MemoryStore::new()));
    let claims = vec![Claim::new("name", "dave")];

    assert!(service.build("Identity.Application", claims.clone()).is_authenticated());
    assert!(service.build("Bearer", vec![]).is_authenticated());
    assert!(!service.build("", claims).is_authenticated());
}

#[tokio::test]
async fn session_principal_carries_roles_and_authorizes() {
    let service = service(Arc::new(MemoryStore::new()));
    let user = register(service.accounts(), "erin").await;
    let session = service.establish_session(&user);
    let principal = service.principal(&session);

    assert!(principal.is_authenticated());
    assert!(principal.is_in_role("reader"));
    assert_eq!(principal.user_id(), Some(user.id.to_string().as_str()));

    let readers = AuthorizationPolicy::builder("readers")
        .require_role(["reader"])
        .build();
    let admins = AuthorizationPolicy::builder("admins")
        .require_role(["admin"])
        .build();
    assert!(service.authorize(&readers, &principal).is_allowed());
    assert!(!service.authorize(&admins, &principal).is_allowed());
}

#[tokio::test]
async fn unknown_user_and_wrong_password_look_the_same() {
    let store = Arc::new(MemoryStore::new());
    let hasher = Arc::new(CountingHasher::new(fast_hasher()));
    let config = test_config();
    let registry = default_registry(&config, store.clone()).unwrap();
    let service = AuthService::new(config, store, hasher.clone(), registry).unwrap();
    register(service.accounts(), "frank").await;

    hasher.reset();
    let unknown = service.authenticate("nobody", PASSWORD).await.unwrap();
    let unknown_verifies = hasher.verifies();

    hasher.reset();
    let wrong = service.authenticate("frank", "Wr0ngPass!").await.unwrap();
    let wrong_verifies = hasher.verifies();

    assert_eq!(unknown.kind(), "failed");
    assert_eq!(wrong.kind(), "failed");
    assert_eq!(unknown_verifies, 1);
    assert_eq!(wrong_verifies, 1);
}

#[tokio::test]
async fn store_failure_propagates() {
    let service = service(Arc::new(FailingStore));

    let err = service.authenticate("alice", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::Store(_)));
    assert!(!err.is_recoverable());

    let mut session = warden_types::Session::new(
        UserId::new(),
        SecurityStamp::generate(),
        "Identity.Application",
        vec![],
        chrono::Utc::now() - ChronoDuration::hours(1),
    );
    let err = service.validate(&mut session).await.unwrap_err();
    assert!(matches!(err, AuthError::Store(_)));
}

#[tokio::test]
async fn ticket_round_trip_and_invalidation() {
    let store = Arc::new(MemoryStore::new());
    let service = service(store.clone());
    let user = register(service.accounts(), "grace").await;
    let session = service.establish_session(&user);

    let ticket = service.protect(&session).unwrap();
    let restored = service.authenticate_ticket(&ticket).await.unwrap().unwrap();
    assert_eq!(restored.id, session.id);
    assert_eq!(restored.claims, session.claims);

    // Age the session so the next check goes to the store
    let mut aged = session.clone();
    aged.last_validated -= ChronoDuration::hours(1);
    let aged_ticket = service.protect(&aged).unwrap();
    service.accounts().update_security_stamp(user.id).await.unwrap();
    assert!(service.authenticate_ticket(&aged_ticket).await.unwrap().is_none());

    let err = service.authenticate_ticket("garbage").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));
}

#[tokio::test]
async fn lockout_after_repeated_failures() {
    let service = service(Arc::new(MemoryStore::new()));
    register(service.accounts(), "heidi").await;

    for _ in 0..2 {
        let outcome = service.authenticate("heidi", "Wr0ngPass!").await.unwrap();
        assert_eq!(outcome.kind(), "failed");
    }
    let outcome = service.authenticate("heidi", "Wr0ngPass!").await.unwrap();
    assert_eq!(outcome.kind(), "locked_out");

    // Correct password is refused while locked out
    let outcome = service.authenticate("heidi", PASSWORD).await.unwrap();
    assert_eq!(outcome.kind(), "locked_out");
}

#[tokio::test]
async fn subscribers_see_sign_in_and_invalidation() {
    let store = Arc::new(MemoryStore::new());
    let service = service(store.clone());
    let user = register(service.accounts(), "ivan").await;

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let id = service.subscribe(move |change: &AuthStateChange| {
        sink.lock().unwrap().push(change.kind());
    });

    let mut session = service.establish_session(&user);
    service.accounts().update_security_stamp(user.id).await.unwrap();
    let later = session.last_validated + ChronoDuration::minutes(45);
    service.validator().validate_at(&mut session, later).await.unwrap();
    service.sign_out(&session);

    assert!(service.unsubscribe(id));
    service.establish_session(&user);

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            "signed_in",
            "security_stamp_changed",
            "session_invalidated",
            "signed_out"
        ]
    );
}

#[tokio::test]
async fn concurrent_validations_agree() {
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(service(store.clone()));
    let user = register(service.accounts(), "judy").await;
    let session = service.establish_session(&user);
    service.accounts().update_security_stamp(user.id).await.unwrap();

    let invalidated = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let invalidated = invalidated.clone();
        let mut session = session.clone();
        handles.push(tokio::spawn(async move {
            let now = session.last_validated + ChronoDuration::hours(1);
            let result = service.validator().validate_at(&mut session, now).await.unwrap();
            if result == StampValidation::Invalidated {
                invalidated.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(invalidated.load(Ordering::SeqCst), 8);
}
