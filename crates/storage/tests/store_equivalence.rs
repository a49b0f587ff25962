// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MemoryStore and WalStore must agree on every sequence of writes, and
//! concurrent WalStore handles must never hand out an order twice.

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use rc_core::{ConstraintUnit, Consumer, ConsumerState};
use rc_storage::{ConsumerStore, MemoryStore, StoreError, WalStore, WalStoreConfig};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

// =============================================================================
// Model-based equivalence
// =============================================================================

#[derive(Debug, Clone)]
enum Step {
    Register { unit: u8, active: bool },
    Finish { unit: u8, pick: usize },
    Promote { unit: u8, pick: usize },
    Reject { unit: u8, pick: usize },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u8..2, any::<bool>()).prop_map(|(unit, active)| Step::Register { unit, active }),
        (0u8..2, 0usize..8).prop_map(|(unit, pick)| Step::Finish { unit, pick }),
        (0u8..2, 0usize..8).prop_map(|(unit, pick)| Step::Promote { unit, pick }),
        (0u8..2, 0usize..8).prop_map(|(unit, pick)| Step::Reject { unit, pick }),
    ]
}

fn created_at() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn unit_name(n: u8) -> ConstraintUnit {
    ConstraintUnit::from(format!("unit-{n}"))
}

/// Apply a step to a store, returning a comparable outcome
fn run(store: &dyn ConsumerStore, step: &Step, counter: &mut u32) -> String {
    let transition = |unit: u8, pick: usize, from: ConsumerState, to: ConsumerState| {
        let unit = unit_name(unit);
        let consumers = store.consumers(&unit).unwrap();
        let Some(target) = consumers.get(pick % consumers.len().max(1)) else {
            return "empty".to_string();
        };
        match store.update_state(&unit, &target.consumer_id, from, to, None) {
            Ok(applied) => format!("{applied}"),
            Err(e) => format!("err:{}", matches!(e, StoreError::InvalidTransition(_))),
        }
    };

    match *step {
        Step::Register { unit, active } => {
            *counter += 1;
            let unit = unit_name(unit);
            let order = store.max_order(&unit).unwrap() + 1;
            let state = if active {
                ConsumerState::Active
            } else {
                ConsumerState::Blocked
            };
            let consumer = Consumer::new(
                unit,
                format!("c{counter}").into(),
                1,
                order,
                state,
                created_at(),
            );
            format!("{:?}", store.insert(&consumer, None).is_ok())
        }
        Step::Finish { unit, pick } => {
            transition(unit, pick, ConsumerState::Active, ConsumerState::Finished)
        }
        Step::Promote { unit, pick } => {
            transition(unit, pick, ConsumerState::Blocked, ConsumerState::Active)
        }
        Step::Reject { unit, pick } => {
            transition(unit, pick, ConsumerState::Blocked, ConsumerState::Rejected)
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn wal_store_matches_memory_store(steps in prop::collection::vec(step(), 1..30)) {
        let dir = TempDir::new().unwrap();
        let memory = MemoryStore::new();
        let wal = WalStore::open(dir.path(), WalStoreConfig::default()).unwrap();
        let (mut mc, mut wc) = (0, 0);

        for step in &steps {
            let expected = run(&memory, step, &mut mc);
            let actual = run(&wal, step, &mut wc);
            prop_assert_eq!(expected, actual);
        }

        drop(wal);
        let reopened = WalStore::open(dir.path(), WalStoreConfig::default()).unwrap();
        for n in 0..2 {
            let unit = unit_name(n);
            prop_assert_eq!(memory.snapshot(&unit).unwrap(), reopened.snapshot(&unit).unwrap());
            prop_assert_eq!(memory.consumers(&unit).unwrap(), reopened.consumers(&unit).unwrap());
        }
    }
}

// =============================================================================
// Concurrent handles
// =============================================================================

#[test]
fn concurrent_handles_never_share_an_order() {
    let dir = TempDir::new().unwrap();
    let unit = ConstraintUnit::from("shared");
    let threads = 4;
    let per_thread = 10;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let store = Arc::new(
                WalStore::open(
                    dir.path(),
                    WalStoreConfig::default().with_machine_id(format!("m{t}")),
                )
                .unwrap(),
            );
            let unit = unit.clone();
            std::thread::spawn(move || {
                for i in 0..per_thread {
                    loop {
                        let view = store.snapshot(&unit).unwrap();
                        let consumer = Consumer::new(
                            unit.clone(),
                            format!("t{t}-{i}").into(),
                            1,
                            view.next_order(),
                            ConsumerState::Blocked,
                            Utc::now(),
                        );
                        match store.insert(&consumer, Some(view.revision)) {
                            Ok(()) => break,
                            Err(e) if e.is_contention() => continue,
                            Err(e) => panic!("unexpected store error: {e}"),
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let store = WalStore::open(dir.path(), WalStoreConfig::default()).unwrap();
    let consumers = store.list_by_unit(&unit).unwrap();
    let orders: HashSet<_> = consumers.iter().map(|c| c.order).collect();
    assert_eq!(consumers.len(), threads * per_thread);
    assert_eq!(orders.len(), consumers.len());
    assert_eq!(store.max_order(&unit).unwrap(), (threads * per_thread) as u64);
}
