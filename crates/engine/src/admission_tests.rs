// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bus::{EventBus, EventReceiver};
use chrono::{DateTime, Utc};
use rc_core::ConsumerState::{Active, Blocked, Finished, Rejected};
use rc_core::FakeClock;
use rc_storage::MemoryStore;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use yare::parameterized;

fn unit() -> ConstraintUnit {
    ConstraintUnit::from("git:acct-1:token-1")
}

fn fifo(capacity: u64) -> ConstraintSpec {
    ConstraintSpec::new(capacity, Strategy::Fifo)
}

fn asap(capacity: u64) -> ConstraintSpec {
    ConstraintSpec::new(capacity, Strategy::Asap)
}

/// View with one consumer per `(permits, state)` pair, orders 1..
fn view_of(consumers: &[(u32, ConsumerState)]) -> UnitView {
    let consumers: Vec<_> = consumers
        .iter()
        .enumerate()
        .map(|(i, (permits, state))| {
            Consumer::new(
                unit(),
                format!("c{}", i + 1).into(),
                *permits,
                i as u64 + 1,
                *state,
                Utc::now(),
            )
        })
        .collect();
    UnitView {
        unit: unit(),
        max_order: consumers.len() as u64,
        revision: consumers.len() as u64,
        consumers,
    }
}

fn ids(ids: &[&str]) -> Vec<ConsumerId> {
    ids.iter().map(|id| ConsumerId::from(*id)).collect()
}

type Engine<S> = AdmissionEngine<S, EventBus, FakeClock>;

fn engine() -> (Engine<MemoryStore>, EventReceiver) {
    engine_with(MemoryStore::new(), AdmissionConfig::default())
}

fn engine_with<S: ConsumerStore>(store: S, config: AdmissionConfig) -> (Engine<S>, EventReceiver) {
    let bus = EventBus::new();
    let (_, rx) = bus.subscribe("**");
    (
        AdmissionEngine::new(store, bus, FakeClock::new(), config),
        rx,
    )
}

async fn register(
    engine: &Engine<impl ConsumerStore>,
    spec: &ConstraintSpec,
    id: &str,
    permits: u32,
) -> Result<(ConsumerState, u64), ConstraintError> {
    engine
        .decide_admission(&unit(), spec, &id.into(), permits, &BTreeMap::new())
        .await
}

fn drain(rx: &mut EventReceiver) -> Vec<String> {
    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(format!("{}:{}", event.name(), event.consumer_id()));
    }
    names
}

// =============================================================================
// Pure decisions
// =============================================================================

#[parameterized(
    empty_unit = { &[], 1, fifo(1), Active },
    full_unit = { &[(1, Active)], 1, fifo(1), Blocked },
    room_left = { &[(1, Active)], 1, fifo(2), Active },
    too_big_for_room = { &[(1, Active)], 2, fifo(2), Blocked },
    fifo_waits_behind_queue = { &[(2, Active), (2, Blocked)], 1, fifo(3), Blocked },
    asap_overtakes_queue = { &[(2, Active), (2, Blocked)], 1, asap(3), Active },
)]
fn decide_table(
    consumers: &[(u32, ConsumerState)],
    permits: u32,
    spec: ConstraintSpec,
    expected: ConsumerState,
) {
    assert_eq!(decide(&view_of(consumers), permits, &spec), expected);
}

#[parameterized(
    nothing_blocked = { &[(1, Active)], fifo(1), &[] },
    head_fits = { &[(1, Blocked), (1, Blocked)], fifo(1), &["c1"] },
    greedy_while_fits = { &[(1, Blocked), (1, Blocked), (1, Blocked)], fifo(2), &["c1", "c2"] },
    fifo_stops_at_head = { &[(1, Active), (2, Blocked), (1, Blocked)], fifo(2), &[] },
    asap_skips_head = { &[(1, Active), (2, Blocked), (1, Blocked)], asap(2), &["c3"] },
    asap_keeps_order = { &[(1, Blocked), (3, Blocked), (1, Blocked)], asap(2), &["c1", "c3"] },
)]
fn plan_table(consumers: &[(u32, ConsumerState)], spec: ConstraintSpec, expected: &[&str]) {
    assert_eq!(plan_promotions(&view_of(consumers), &spec), ids(expected));
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn first_consumer_is_admitted_second_queued() {
    let (engine, mut rx) = engine();

    assert_eq!(register(&engine, &fifo(1), "a", 1).await.unwrap(), (Active, 1));
    assert_eq!(register(&engine, &fifo(1), "b", 1).await.unwrap(), (Blocked, 2));

    assert_eq!(
        drain(&mut rx),
        vec!["constraint:registered:a", "constraint:registered:b"]
    );
}

#[tokio::test]
async fn zero_permits_are_invalid() {
    let (engine, _rx) = engine();
    assert!(matches!(
        register(&engine, &fifo(1), "a", 0).await,
        Err(ConstraintError::InvalidPermits { permits: 0 })
    ));
}

#[tokio::test]
async fn oversized_request_fails_fast() {
    let (engine, _rx) = engine();
    let err = register(&engine, &fifo(1), "a", 2).await.unwrap_err();

    assert!(matches!(
        err,
        ConstraintError::PermanentlyBlocked {
            permits: 2,
            capacity: 1,
            ..
        }
    ));
    assert!(engine.store().consumers(&unit()).unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_consumer_is_surfaced() {
    let (engine, _rx) = engine();
    register(&engine, &fifo(1), "a", 1).await.unwrap();

    assert!(matches!(
        register(&engine, &fifo(1), "a", 1).await,
        Err(ConstraintError::DuplicateConsumer { .. })
    ));
}

#[tokio::test]
async fn context_is_stored_with_the_consumer() {
    let (engine, _rx) = engine();
    let context = BTreeMap::from([("workflow".to_string(), "wf-9".to_string())]);
    engine
        .decide_admission(&unit(), &fifo(1), &"a".into(), 1, &context)
        .await
        .unwrap();

    assert_eq!(engine.query(&unit(), &"a".into()).unwrap().context, context);
}

#[tokio::test]
async fn registration_stamps_clock_time() {
    let (engine, _rx) = engine();
    let now: DateTime<Utc> = engine.clock().now();
    register(&engine, &fifo(1), "a", 1).await.unwrap();

    assert_eq!(engine.query(&unit(), &"a".into()).unwrap().created_at, now);
}

#[tokio::test]
async fn stranded_queue_is_drained_on_register() {
    // Simulate a crash between finishing A and promoting B
    let store = MemoryStore::new();
    let (engine, _rx) = engine_with(store.clone(), AdmissionConfig::default());
    register(&engine, &fifo(1), "a", 1).await.unwrap();
    register(&engine, &fifo(1), "b", 1).await.unwrap();
    store
        .update_state(&unit(), &"a".into(), Active, Finished, None)
        .unwrap();

    let (state, order) = register(&engine, &fifo(1), "c", 1).await.unwrap();

    assert_eq!((state, order), (Blocked, 3));
    assert_eq!(engine.query(&unit(), &"b".into()).unwrap().state, Active);
}

#[tokio::test]
async fn asap_newcomer_does_not_overtake_stranded_consumers() {
    let store = MemoryStore::new();
    let (engine, _rx) = engine_with(store.clone(), AdmissionConfig::default());
    register(&engine, &asap(2), "a", 1).await.unwrap();
    register(&engine, &asap(2), "b", 1).await.unwrap();
    register(&engine, &asap(2), "d", 1).await.unwrap();
    store
        .update_state(&unit(), &"a".into(), Active, Finished, None)
        .unwrap();

    let (state, order) = register(&engine, &asap(2), "e", 1).await.unwrap();

    assert_eq!((state, order), (Blocked, 4));
    assert_eq!(engine.query(&unit(), &"d".into()).unwrap().state, Active);
}

// =============================================================================
// Contention
// =============================================================================

/// Store that reports a revision conflict for the first `conflicts` inserts
struct ContendedStore {
    inner: MemoryStore,
    conflicts: AtomicU32,
}

impl ContendedStore {
    fn new(conflicts: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            conflicts: AtomicU32::new(conflicts),
        })
    }
}

impl ConsumerStore for ContendedStore {
    fn insert(&self, consumer: &Consumer, expected: Option<u64>) -> Result<(), StoreError> {
        let left = self.conflicts.load(Ordering::SeqCst);
        if left > 0 {
            self.conflicts.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Conflict {
                unit: consumer.unit.clone(),
                expected: expected.unwrap_or(0),
                actual: expected.unwrap_or(0) + 1,
            });
        }
        self.inner.insert(consumer, expected)
    }

    fn update_state(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        from: ConsumerState,
        to: ConsumerState,
        expected: Option<u64>,
    ) -> Result<bool, StoreError> {
        self.inner.update_state(unit, consumer_id, from, to, expected)
    }

    fn snapshot(&self, unit: &ConstraintUnit) -> Result<UnitView, StoreError> {
        self.inner.snapshot(unit)
    }

    fn get(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<Option<Consumer>, StoreError> {
        self.inner.get(unit, consumer_id)
    }

    fn consumers(&self, unit: &ConstraintUnit) -> Result<Vec<Consumer>, StoreError> {
        self.inner.consumers(unit)
    }

    fn units(&self) -> Result<Vec<ConstraintUnit>, StoreError> {
        self.inner.units()
    }

    fn prune_terminal(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.inner.prune_terminal(cutoff)
    }
}

#[tokio::test]
async fn contention_is_retried_within_budget() {
    let (engine, _rx) = engine_with(ContendedStore::new(4), AdmissionConfig::default());
    assert_eq!(register(&engine, &fifo(1), "a", 1).await.unwrap(), (Active, 1));
}

#[tokio::test]
async fn exhausted_retries_are_unable_to_register() {
    let config = AdmissionConfig::default().with_max_register_attempts(3);
    let (engine, _rx) = engine_with(ContendedStore::new(3), config);

    let err = register(&engine, &fifo(1), "a", 1).await.unwrap_err();

    assert!(matches!(
        err,
        ConstraintError::UnableToRegister { attempts: 3, .. }
    ));
    assert!(err.is_transient());
}

// =============================================================================
// Release and promotion
// =============================================================================

#[tokio::test]
async fn release_promotes_next_in_order() {
    let (engine, mut rx) = engine();
    register(&engine, &fifo(1), "a", 1).await.unwrap();
    register(&engine, &fifo(1), "b", 1).await.unwrap();
    register(&engine, &fifo(1), "c", 1).await.unwrap();
    drain(&mut rx);

    let promoted = engine
        .promote_on_release(&unit(), &fifo(1), &"a".into())
        .await
        .unwrap();

    assert_eq!(promoted, ids(&["b"]));
    assert_eq!(
        drain(&mut rx),
        vec!["constraint:finished:a", "constraint:promoted:b"]
    );
    assert_eq!(engine.query(&unit(), &"c".into()).unwrap().state, Blocked);
}

#[tokio::test]
async fn release_is_idempotent() {
    let (engine, _rx) = engine();
    register(&engine, &fifo(1), "a", 1).await.unwrap();
    register(&engine, &fifo(1), "b", 1).await.unwrap();

    let first = engine
        .promote_on_release(&unit(), &fifo(1), &"a".into())
        .await
        .unwrap();
    let second = engine
        .promote_on_release(&unit(), &fifo(1), &"a".into())
        .await
        .unwrap();

    assert_eq!(first, ids(&["b"]));
    assert!(second.is_empty());
}

#[tokio::test]
async fn releasing_unknown_consumer_is_not_found() {
    let (engine, _rx) = engine();
    assert!(matches!(
        engine
            .promote_on_release(&unit(), &fifo(1), &"ghost".into())
            .await,
        Err(ConstraintError::ConsumerNotFound { .. })
    ));
}

#[tokio::test]
async fn release_promotes_several_small_consumers() {
    let (engine, _rx) = engine();
    register(&engine, &fifo(3), "big", 3).await.unwrap();
    register(&engine, &fifo(3), "x", 1).await.unwrap();
    register(&engine, &fifo(3), "y", 2).await.unwrap();
    register(&engine, &fifo(3), "z", 1).await.unwrap();

    let promoted = engine
        .promote_on_release(&unit(), &fifo(3), &"big".into())
        .await
        .unwrap();

    assert_eq!(promoted, ids(&["x", "y"]));
}

#[tokio::test]
async fn asap_promotes_around_a_large_head() {
    let (engine, _rx) = engine();
    register(&engine, &asap(2), "a", 1).await.unwrap();
    register(&engine, &asap(2), "b", 1).await.unwrap();
    register(&engine, &asap(2), "big", 2).await.unwrap();
    register(&engine, &asap(2), "small", 1).await.unwrap();

    let promoted = engine
        .promote_on_release(&unit(), &asap(2), &"a".into())
        .await
        .unwrap();

    assert_eq!(promoted, ids(&["small"]));
    assert_eq!(engine.query(&unit(), &"big".into()).unwrap().state, Blocked);
}

#[tokio::test]
async fn promote_pending_without_room_is_empty() {
    let (engine, _rx) = engine();
    register(&engine, &fifo(1), "a", 1).await.unwrap();
    register(&engine, &fifo(1), "b", 1).await.unwrap();

    assert!(engine
        .promote_pending(&unit(), &fifo(1))
        .await
        .unwrap()
        .is_empty());
    assert!(!engine.has_pending(&unit(), &fifo(1)).unwrap());
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn cancel_rejects_blocked_consumer_once() {
    let (engine, mut rx) = engine();
    register(&engine, &fifo(1), "a", 1).await.unwrap();
    register(&engine, &fifo(1), "b", 1).await.unwrap();
    drain(&mut rx);

    assert!(engine.cancel(&unit(), &"b".into()).await.unwrap());
    assert!(!engine.cancel(&unit(), &"b".into()).await.unwrap());
    assert_eq!(drain(&mut rx), vec!["constraint:rejected:b"]);

    let promoted = engine
        .promote_on_release(&unit(), &fifo(1), &"a".into())
        .await
        .unwrap();
    assert!(promoted.is_empty());
    assert_eq!(engine.query(&unit(), &"b".into()).unwrap().state, Rejected);
}

#[tokio::test]
async fn cancel_does_not_touch_active_consumer() {
    let (engine, _rx) = engine();
    register(&engine, &fifo(1), "a", 1).await.unwrap();

    assert!(!engine.cancel(&unit(), &"a".into()).await.unwrap());
    assert_eq!(engine.query(&unit(), &"a".into()).unwrap().state, Active);
}

#[tokio::test]
async fn query_unknown_consumer_is_not_found() {
    let (engine, _rx) = engine();
    assert!(matches!(
        engine.query(&unit(), &"ghost".into()),
        Err(ConstraintError::ConsumerNotFound { .. })
    ));
}
