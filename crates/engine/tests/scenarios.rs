// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end admission scenarios: ordering, fail-fast, recovery after a
//! restart, and races between workers sharing one store.

#![allow(clippy::unwrap_used, clippy::panic)]

use rc_core::{
    ConstraintEvent, ConstraintUnit, ConsumerId, ConsumerState, FakeClock, SystemClock,
};
use rc_engine::{
    AdmissionConfig, Config, ConstraintError, ConstraintSpec, Constraints, EventBus, GateConfig,
    GateRequest, NoOpNotifier, StepGate,
};
use rc_storage::{MemoryStore, WalStore, WalStoreConfig};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn unit() -> ConstraintUnit {
    ConstraintUnit::from("git:acct-1:token-1")
}

fn id(id: &str) -> ConsumerId {
    ConsumerId::from(id)
}

fn no_context() -> BTreeMap<String, String> {
    BTreeMap::new()
}

fn worker(dir: &Path, name: &str) -> Constraints<WalStore, NoOpNotifier, SystemClock> {
    let store = WalStore::open(dir, WalStoreConfig::default().with_machine_id(name)).unwrap();
    Constraints::new(store, NoOpNotifier, SystemClock, Config::default())
}

#[tokio::test]
async fn fifo_promotion_with_capacity_one() {
    let constraints = Constraints::new(
        MemoryStore::new(),
        EventBus::new(),
        FakeClock::new(),
        Config::default(),
    );
    let (_, mut events) = constraints.subscribe("constraint:promoted");

    let a = constraints
        .register(&unit(), &id("a"), 1, &no_context())
        .await
        .unwrap();
    let b = constraints
        .register(&unit(), &id("b"), 1, &no_context())
        .await
        .unwrap();
    assert_eq!((a, b), (ConsumerState::Active, ConsumerState::Blocked));
    assert_eq!(constraints.query(&unit(), &id("b")).unwrap().order, 2);

    assert_eq!(
        constraints.release(&unit(), &id("a")).await.unwrap(),
        vec![id("b")]
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ConstraintEvent::Promoted {
            unit: unit(),
            consumer_id: id("b"),
        }
    );
    assert!(constraints
        .release(&unit(), &id("b"))
        .await
        .unwrap()
        .is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn request_beyond_capacity_fails_fast() {
    let constraints = Constraints::new(
        MemoryStore::new(),
        NoOpNotifier,
        FakeClock::new(),
        Config::default(),
    );

    let err = constraints
        .register(&unit(), &id("a"), 2, &no_context())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConstraintError::PermanentlyBlocked {
            permits: 2,
            capacity: 1,
            ..
        }
    ));
    assert!(!err.is_transient());
    assert_eq!(constraints.max_order(&unit()).unwrap(), 0);
}

#[tokio::test]
async fn admission_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let before = worker(dir.path(), "before");
        before
            .register(&unit(), &id("a"), 1, &no_context())
            .await
            .unwrap();
    }

    let after = worker(dir.path(), "after");
    let state = after
        .register(&unit(), &id("b"), 1, &no_context())
        .await
        .unwrap();

    assert_eq!(state, ConsumerState::Blocked);
    assert_eq!(after.max_order(&unit()).unwrap(), 2);
    assert_eq!(
        after.query(&unit(), &id("a")).unwrap().state,
        ConsumerState::Active
    );

    assert_eq!(after.release(&unit(), &id("a")).await.unwrap(), vec![id("b")]);
}

#[tokio::test]
async fn second_worker_sees_release_of_first() {
    let dir = TempDir::new().unwrap();
    let one = worker(dir.path(), "one");
    let two = worker(dir.path(), "two");

    one.register(&unit(), &id("a"), 1, &no_context())
        .await
        .unwrap();
    assert_eq!(
        two.register(&unit(), &id("b"), 1, &no_context())
            .await
            .unwrap(),
        ConsumerState::Blocked
    );

    assert_eq!(one.release(&unit(), &id("a")).await.unwrap(), vec![id("b")]);
    assert_eq!(
        two.query(&unit(), &id("b")).unwrap().state,
        ConsumerState::Active
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_consumer_is_never_promoted() {
    for round in 0..50 {
        let constraints = Constraints::new(
            MemoryStore::new(),
            EventBus::new(),
            FakeClock::new(),
            Config::default(),
        );
        let (_, mut promoted) = constraints.subscribe("constraint:promoted");
        constraints
            .register(&unit(), &id("a"), 1, &no_context())
            .await
            .unwrap();
        constraints
            .register(&unit(), &id("b"), 1, &no_context())
            .await
            .unwrap();

        let canceller = {
            let constraints = constraints.clone();
            tokio::spawn(async move { constraints.cancel(&unit(), &id("b")).await })
        };
        let releaser = {
            let constraints = constraints.clone();
            tokio::spawn(async move { constraints.release(&unit(), &id("a")).await })
        };
        let cancelled = canceller.await.unwrap().unwrap();
        let released = releaser.await.unwrap().unwrap();

        let b = constraints.query(&unit(), &id("b")).unwrap();
        if cancelled {
            assert_eq!(b.state, ConsumerState::Rejected, "round {round}");
            assert!(released.is_empty(), "round {round}");
            assert!(promoted.try_recv().is_err(), "round {round}");
        } else {
            assert_eq!(b.state, ConsumerState::Active, "round {round}");
            assert_eq!(released, vec![id("b")], "round {round}");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn workers_on_one_directory_never_exceed_capacity() {
    const CAPACITY: u64 = 2;
    let dir = TempDir::new().unwrap();
    let inside = Arc::new(AtomicU64::new(0));
    let peak = Arc::new(AtomicU64::new(0));

    let mut tasks = Vec::new();
    for w in 0..6 {
        let store = WalStore::open(
            dir.path(),
            WalStoreConfig::default().with_machine_id(format!("worker-{w}")),
        )
        .unwrap();
        let config = Config::default()
            .with_defaults(ConstraintSpec::new(CAPACITY, rc_core::Strategy::Fifo))
            .with_admission(
                AdmissionConfig::default()
                    .with_max_register_attempts(1000)
                    .with_max_promotion_attempts(1000),
            )
            .with_gate(GateConfig::default().with_poll_interval(Duration::from_millis(5)));
        let gate = StepGate::new(Constraints::new(store, NoOpNotifier, SystemClock, config));
        let inside = Arc::clone(&inside);
        let peak = Arc::clone(&peak);

        tasks.push(tokio::spawn(async move {
            for round in 0..3 {
                let request = GateRequest::new(unit(), format!("w{w}-r{round}"));
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                gate.run(&request, || async move {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
            }
        }));
    }

    for task in tasks {
        tokio::time::timeout(Duration::from_secs(60), task)
            .await
            .unwrap()
            .unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= CAPACITY);
    let check = worker(dir.path(), "check");
    assert_eq!(check.max_order(&unit()).unwrap(), 18);
    assert!(check
        .consumers(&unit())
        .unwrap()
        .iter()
        .all(|c| c.state == ConsumerState::Finished));
}
