//! Races and partial failures.
//!
//! Real races are exercised with spawned tasks over the shared in-memory
//! store; the narrower interleavings are pinned down deterministically with
//! `HookStore` (inject a rival operation mid-flow) and `FlakyStore` (fail a
//! chosen store call).

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::{TimeZone, Utc};
use guestlist_core::error::{ErrorKind, GuestlistError};
use guestlist_core::store::{MemoryStore, StoreError};
use guestlist_core::types::{EventId, UserId};
use guestlist_engine::{EngineConfig, RegistrationEngine, RetryPolicy};
use guestlist_testing::faults::{FlakyStore, HookStore, StoreOp};
use guestlist_testing::fixtures::event_draft;
use guestlist_testing::mocks::FixedClock;
use std::sync::Arc;
use std::time::Duration;

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ))
}

async fn seed_users<S: guestlist_core::store::EntityStore>(
    engine: &RegistrationEngine<S>,
    ids: &[&str],
) {
    for id in ids {
        engine
            .users()
            .create_user(UserId::new(*id), format!("User {id}"))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn concurrent_duplicate_registers_admit_exactly_one() {
    guestlist_testing::init_tracing();
    let engine = Arc::new(RegistrationEngine::new(
        Arc::new(MemoryStore::new()),
        clock(),
    ));
    seed_users(&engine, &["u1"]).await;
    engine
        .events()
        .create_event(event_draft("e1", 5, false))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .register(&UserId::new("u1"), &EventId::new("e1"))
                .await
        }));
    }

    let mut ok = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(GuestlistError::AlreadyRegistered { .. }) => conflicts += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(conflicts, 1);

    let registrations = engine
        .get_event_registrations(&EventId::new("e1"))
        .await
        .unwrap();
    assert_eq!(registrations.len(), 1);
}

#[tokio::test]
async fn register_burst_never_oversubscribes() {
    guestlist_testing::init_tracing();
    let engine = Arc::new(RegistrationEngine::new(
        Arc::new(MemoryStore::new()),
        clock(),
    ));
    let ids: Vec<String> = (1..=10).map(|n| format!("u{n}")).collect();
    for id in &ids {
        engine
            .users()
            .create_user(UserId::new(id.clone()), format!("User {id}"))
            .await
            .unwrap();
    }
    let event = engine
        .events()
        .create_event(event_draft("e1", 3, true))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for id in &ids {
        let engine = Arc::clone(&engine);
        let user_id = UserId::new(id.clone());
        let event_id = event.event_id.clone();
        handles.push(tokio::spawn(async move {
            engine.register(&user_id, &event_id).await
        }));
    }
    for handle in handles {
        // Waitlist enabled: every registration lands somewhere.
        handle.await.unwrap().unwrap();
    }

    let registrations = engine
        .get_event_registrations(&event.event_id)
        .await
        .unwrap();
    let registered = registrations.iter().filter(|r| r.is_registered()).count();
    let waitlisted = registrations.iter().filter(|r| r.is_waitlisted()).count();
    assert_eq!(registered, 3);
    assert_eq!(waitlisted, 7);

    let stored = engine.events().get_event(&event.event_id).await.unwrap();
    assert_eq!(stored.current_registrations, 3);
}

#[tokio::test]
async fn losing_the_capacity_race_lands_on_the_waitlist() {
    guestlist_testing::init_tracing();
    let inner = MemoryStore::new();
    let hooked = Arc::new(HookStore::new(inner.clone()));
    let engine = RegistrationEngine::new(Arc::clone(&hooked), clock());
    let rival = Arc::new(RegistrationEngine::new(Arc::new(inner), clock()));

    seed_users(&engine, &["u1", "u2"]).await;
    let event = engine
        .events()
        .create_event(event_draft("e1", 1, true))
        .await
        .unwrap();
    let event_id = event.event_id.clone();

    // u2 grabs the last slot in the window between u1's capacity read and
    // u1's counter increment.
    hooked.on_next(StoreOp::Add, move || async move {
        rival
            .register(&UserId::new("u2"), &event_id)
            .await
            .unwrap();
    });

    let outcome = engine
        .register(&UserId::new("u1"), &event.event_id)
        .await
        .unwrap();
    assert!(outcome.is_waitlisted());
    assert!(outcome.waitlist_token.is_some());

    let u2 = engine
        .ledger()
        .get_registration(&UserId::new("u2"), &event.event_id)
        .await
        .unwrap()
        .unwrap();
    assert!(u2.is_registered());
    let stored = engine.events().get_event(&event.event_id).await.unwrap();
    assert_eq!(stored.current_registrations, 1);
}

#[tokio::test]
async fn losing_the_capacity_race_without_a_waitlist_rolls_back() {
    guestlist_testing::init_tracing();
    let inner = MemoryStore::new();
    let hooked = Arc::new(HookStore::new(inner.clone()));
    let engine = RegistrationEngine::new(Arc::clone(&hooked), clock());
    let rival = Arc::new(RegistrationEngine::new(Arc::new(inner), clock()));

    seed_users(&engine, &["u1", "u2"]).await;
    let event = engine
        .events()
        .create_event(event_draft("e1", 1, false))
        .await
        .unwrap();
    let event_id = event.event_id.clone();

    hooked.on_next(StoreOp::Add, move || async move {
        rival
            .register(&UserId::new("u2"), &event_id)
            .await
            .unwrap();
    });

    let err = engine
        .register(&UserId::new("u1"), &event.event_id)
        .await
        .unwrap_err();
    assert!(matches!(err, GuestlistError::CapacityExceeded { .. }));

    // The loser's entry was rolled back; only the rival remains.
    assert!(
        engine
            .ledger()
            .get_registration(&UserId::new("u1"), &event.event_id)
            .await
            .unwrap()
            .is_none()
    );
    let stored = engine.events().get_event(&event.event_id).await.unwrap();
    assert_eq!(stored.current_registrations, 1);
}

#[tokio::test]
async fn unregister_racing_a_promotion_of_the_same_user_stays_consistent() {
    guestlist_testing::init_tracing();
    let inner = MemoryStore::new();
    let hooked = Arc::new(HookStore::new(inner.clone()));
    let engine = RegistrationEngine::new(Arc::clone(&hooked), clock());
    let rival = Arc::new(RegistrationEngine::new(Arc::new(inner), clock()));

    seed_users(&engine, &["u1", "u2"]).await;
    let event = engine
        .events()
        .create_event(event_draft("e1", 1, true))
        .await
        .unwrap();
    engine.register(&UserId::new("u1"), &event.event_id).await.unwrap();
    engine.register(&UserId::new("u2"), &event.event_id).await.unwrap();

    // u2 leaves the waitlist just as u1's unregister promotes u2: the
    // rival runs between u2's status read and the guarded primary delete,
    // so the delete must fail its guard, re-read the promoted status, and
    // remove a registered entry (freeing the slot), not a waitlisted one.
    let event_id = event.event_id.clone();
    hooked.on_next(StoreOp::DeleteWhen, move || async move {
        rival
            .unregister(&UserId::new("u1"), &event_id)
            .await
            .unwrap();
    });

    engine
        .unregister(&UserId::new("u2"), &event.event_id)
        .await
        .unwrap();

    // Both operations completed and the ledger agrees with the counter:
    // nobody is registered, no index record is orphaned.
    let stored = engine.events().get_event(&event.event_id).await.unwrap();
    assert_eq!(stored.current_registrations, 0);
    assert!(
        engine
            .get_event_registrations(&event.event_id)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        engine
            .ledger()
            .get_registration(&UserId::new("u2"), &event.event_id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn promotion_guard_failure_is_retried_once() {
    guestlist_testing::init_tracing();
    let store = Arc::new(FlakyStore::new(MemoryStore::new()));
    let engine = RegistrationEngine::new(Arc::clone(&store), clock());
    seed_users(&engine, &["u1", "u2", "u3"]).await;
    let event = engine
        .events()
        .create_event(event_draft("e1", 1, true))
        .await
        .unwrap();
    for id in ["u1", "u2", "u3"] {
        engine.register(&UserId::new(id), &event.event_id).await.unwrap();
    }

    // First guarded status flip fails as if a rival promotion won; the
    // re-query finds the head unchanged and the second flip succeeds.
    store.fail_next(StoreOp::UpdateWhen, StoreError::ConditionFailed);
    engine
        .unregister(&UserId::new("u1"), &event.event_id)
        .await
        .unwrap();

    let u2 = engine
        .ledger()
        .get_registration(&UserId::new("u2"), &event.event_id)
        .await
        .unwrap()
        .unwrap();
    assert!(u2.is_registered());
    let u3 = engine
        .ledger()
        .get_registration(&UserId::new("u3"), &event.event_id)
        .await
        .unwrap()
        .unwrap();
    assert!(u3.is_waitlisted());
    let stored = engine.events().get_event(&event.event_id).await.unwrap();
    assert_eq!(stored.current_registrations, 1);
}

#[tokio::test]
async fn unresolved_promotion_reports_an_inconsistency() {
    guestlist_testing::init_tracing();
    let store = Arc::new(FlakyStore::new(MemoryStore::new()));
    let engine = RegistrationEngine::new(Arc::clone(&store), clock());
    seed_users(&engine, &["u1", "u2"]).await;
    let event = engine
        .events()
        .create_event(event_draft("e1", 1, true))
        .await
        .unwrap();
    engine.register(&UserId::new("u1"), &event.event_id).await.unwrap();
    engine.register(&UserId::new("u2"), &event.event_id).await.unwrap();

    // Both the first flip and the post-re-query flip fail.
    store.fail_times(StoreOp::UpdateWhen, 2, StoreError::ConditionFailed);
    let err = engine
        .unregister(&UserId::new("u1"), &event.event_id)
        .await
        .unwrap_err();
    assert!(matches!(err, GuestlistError::StoreInconsistency { .. }));
    assert_eq!(err.kind(), ErrorKind::Internal);

    // Every reservation was released: the slot is free and the head is
    // still queued.
    let stored = engine.events().get_event(&event.event_id).await.unwrap();
    assert_eq!(stored.current_registrations, 0);
    let u2 = engine
        .ledger()
        .get_registration(&UserId::new("u2"), &event.event_id)
        .await
        .unwrap()
        .unwrap();
    assert!(u2.is_waitlisted());
}

#[tokio::test]
async fn counter_increment_failure_surfaces_as_inconsistency() {
    guestlist_testing::init_tracing();
    let store = Arc::new(FlakyStore::new(MemoryStore::new()));
    let engine = RegistrationEngine::with_config(
        Arc::clone(&store),
        clock(),
        EngineConfig::default().with_counter_retry(RetryPolicy::none()),
    );
    seed_users(&engine, &["u1"]).await;
    let event = engine
        .events()
        .create_event(event_draft("e1", 5, false))
        .await
        .unwrap();

    store.fail_next(StoreOp::Add, StoreError::Backend("write timeout".to_string()));
    let err = engine
        .register(&UserId::new("u1"), &event.event_id)
        .await
        .unwrap_err();
    assert!(matches!(err, GuestlistError::StoreInconsistency { .. }));

    // The ledger entry exists but the counter was never bumped; the drift
    // is reported, not hidden.
    let entry = engine
        .ledger()
        .get_registration(&UserId::new("u1"), &event.event_id)
        .await
        .unwrap()
        .unwrap();
    assert!(entry.is_registered());
    let stored = engine.events().get_event(&event.event_id).await.unwrap();
    assert_eq!(stored.current_registrations, 0);
}

#[tokio::test]
async fn counter_decrement_failure_surfaces_as_inconsistency() {
    guestlist_testing::init_tracing();
    let store = Arc::new(FlakyStore::new(MemoryStore::new()));
    let engine = RegistrationEngine::with_config(
        Arc::clone(&store),
        clock(),
        EngineConfig::default().with_counter_retry(RetryPolicy::none()),
    );
    seed_users(&engine, &["u1"]).await;
    let event = engine
        .events()
        .create_event(event_draft("e1", 5, false))
        .await
        .unwrap();
    engine.register(&UserId::new("u1"), &event.event_id).await.unwrap();

    store.fail_next(StoreOp::Add, StoreError::Backend("write timeout".to_string()));
    let err = engine
        .unregister(&UserId::new("u1"), &event.event_id)
        .await
        .unwrap_err();
    assert!(matches!(err, GuestlistError::StoreInconsistency { .. }));

    // The removal itself is durable.
    assert!(
        engine
            .ledger()
            .get_registration(&UserId::new("u1"), &event.event_id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn transient_counter_failures_are_retried_through() {
    guestlist_testing::init_tracing();
    let store = Arc::new(FlakyStore::new(MemoryStore::new()));
    let engine = RegistrationEngine::with_config(
        Arc::clone(&store),
        clock(),
        EngineConfig::default().with_counter_retry(
            RetryPolicy::default().with_initial_delay(Duration::ZERO),
        ),
    );
    seed_users(&engine, &["u1"]).await;
    let event = engine
        .events()
        .create_event(event_draft("e1", 5, false))
        .await
        .unwrap();

    store.fail_next(StoreOp::Add, StoreError::Backend("blip".to_string()));
    let registration = engine
        .register(&UserId::new("u1"), &event.event_id)
        .await
        .unwrap();
    assert!(registration.is_registered());

    let stored = engine.events().get_event(&event.event_id).await.unwrap();
    assert_eq!(stored.current_registrations, 1);
}
