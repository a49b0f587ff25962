// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use rc_core::ConsumerState::{Active, Blocked, Finished, Rejected};

fn ts() -> DateTime<Utc> {
    Utc.timestamp_micros(1_705_123_456_789_000).unwrap()
}

fn unit() -> ConstraintUnit {
    ConstraintUnit::from("git:acct-1:token-1")
}

fn consumer(id: &str, order: u64, state: ConsumerState) -> Consumer {
    Consumer::new(unit(), id.into(), 1, order, state, ts())
}

fn insert(state: &mut MaterializedState, c: &Consumer) {
    let op = state.prepare_insert(c, None).unwrap();
    state.apply(&op).unwrap();
}

#[test]
fn apply_insert_creates_unit() {
    let mut state = MaterializedState::new();
    insert(&mut state, &consumer("a", 1, Active));

    let view = state.view(&unit());
    assert_eq!(view.consumers.len(), 1);
    assert_eq!(view.max_order, 1);
    assert_eq!(view.revision, 1);
    assert_eq!(view.active_permits(), 1);
}

#[test]
fn view_of_unknown_unit_is_empty() {
    let state = MaterializedState::new();
    let view = state.view(&unit());
    assert!(view.consumers.is_empty());
    assert_eq!(view.max_order, 0);
    assert_eq!(view.revision, 0);
    assert_eq!(view.next_order(), 1);
}

#[test]
fn apply_insert_duplicate_fails() {
    let mut state = MaterializedState::new();
    let op = state.prepare_insert(&consumer("a", 1, Active), None).unwrap();
    state.apply(&op).unwrap();

    assert!(matches!(state.apply(&op), Err(ApplyError::AlreadyExists { .. })));
}

#[test]
fn prepare_insert_rejects_duplicate_consumer() {
    let mut state = MaterializedState::new();
    insert(&mut state, &consumer("a", 1, Active));

    let err = state
        .prepare_insert(&consumer("a", 2, Blocked), None)
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateConsumer { .. }));
}

#[test]
fn prepare_insert_rejects_taken_order() {
    let mut state = MaterializedState::new();
    insert(&mut state, &consumer("a", 1, Active));

    let err = state
        .prepare_insert(&consumer("b", 1, Blocked), None)
        .unwrap_err();
    assert!(matches!(err, StoreError::OrderTaken { order: 1, .. }));
    assert!(err.is_contention());
}

#[test]
fn prepare_insert_rejects_stale_revision() {
    let mut state = MaterializedState::new();
    insert(&mut state, &consumer("a", 1, Active));

    let err = state
        .prepare_insert(&consumer("b", 2, Blocked), Some(0))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Conflict {
            expected: 0,
            actual: 1,
            ..
        }
    ));
    assert!(state.prepare_insert(&consumer("b", 2, Blocked), Some(1)).is_ok());
}

#[test]
fn prepare_insert_rejects_terminal_initial_state() {
    let state = MaterializedState::new();
    let err = state
        .prepare_insert(&consumer("a", 1, Finished), None)
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInitialState(Finished)));
}

#[test]
fn prepare_insert_rejects_zero_permits() {
    let state = MaterializedState::new();
    let mut c = consumer("a", 1, Active);
    c.permits = 0;
    assert!(matches!(
        state.prepare_insert(&c, None),
        Err(StoreError::ZeroPermits { .. })
    ));
}

#[test]
fn transition_from_wrong_state_is_a_lost_race() {
    let mut state = MaterializedState::new();
    insert(&mut state, &consumer("a", 1, Active));

    let prepared = state
        .prepare_transition(&unit(), &"a".into(), Blocked, Active, None)
        .unwrap();
    assert!(prepared.is_none());
}

#[test]
fn illegal_transition_is_rejected() {
    let mut state = MaterializedState::new();
    insert(&mut state, &consumer("a", 1, Active));

    let err = state
        .prepare_transition(&unit(), &"a".into(), Finished, Active, None)
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition(_)));
}

#[test]
fn transition_of_unknown_consumer_is_not_found() {
    let state = MaterializedState::new();
    let err = state
        .prepare_transition(&unit(), &"ghost".into(), Active, Finished, None)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[test]
fn finished_consumers_leave_the_view_but_stay_queryable() {
    let mut state = MaterializedState::new();
    insert(&mut state, &consumer("a", 1, Active));
    let op = state
        .prepare_transition(&unit(), &"a".into(), Active, Finished, Some(1))
        .unwrap()
        .unwrap();
    state.apply(&op).unwrap();

    let view = state.view(&unit());
    assert!(view.consumers.is_empty());
    assert_eq!(view.revision, 2);
    assert_eq!(view.max_order, 1);
    assert_eq!(state.consumer(&unit(), &"a".into()).unwrap().state, Finished);
    assert_eq!(state.all_consumers(&unit()).len(), 1);
}

#[test]
fn view_orders_consumers_by_order() {
    let mut state = MaterializedState::new();
    insert(&mut state, &consumer("z", 1, Active));
    insert(&mut state, &consumer("a", 2, Blocked));
    insert(&mut state, &consumer("m", 3, Blocked));

    let ids: Vec<_> = state
        .view(&unit())
        .consumers
        .iter()
        .map(|c| c.consumer_id.to_string())
        .collect();
    assert_eq!(ids, vec!["z", "a", "m"]);
}

#[test]
fn apply_transition_rechecks_recorded_state() {
    let mut state = MaterializedState::new();
    insert(&mut state, &consumer("b", 1, Blocked));
    let reject = Operation::ConsumerTransition(ConsumerTransitionOp {
        unit: unit(),
        consumer_id: "b".into(),
        from: Blocked,
        to: Rejected,
    });
    let promote = Operation::ConsumerTransition(ConsumerTransitionOp {
        unit: unit(),
        consumer_id: "b".into(),
        from: Blocked,
        to: Active,
    });
    state.apply(&reject).unwrap();

    assert!(matches!(
        state.apply(&promote),
        Err(ApplyError::InvalidTransition(_))
    ));
    assert_eq!(state.consumer(&unit(), &"b".into()).unwrap().state, Rejected);
}

#[test]
fn prune_terminal_keeps_max_order() {
    let mut state = MaterializedState::new();
    insert(&mut state, &consumer("a", 1, Active));
    insert(&mut state, &consumer("b", 2, Blocked));
    let op = state
        .prepare_transition(&unit(), &"a".into(), Active, Finished, None)
        .unwrap()
        .unwrap();
    state.apply(&op).unwrap();

    let removed = state.prune_terminal(ts() + chrono::Duration::seconds(1));

    assert_eq!(removed, 1);
    assert!(state.consumer(&unit(), &"a".into()).is_none());
    assert_eq!(state.view(&unit()).max_order, 2);
    assert!(matches!(
        state.prepare_insert(&consumer("c", 2, Blocked), None),
        Err(StoreError::OrderTaken { .. })
    ));
}

#[test]
fn prune_terminal_ignores_recent_and_live_consumers() {
    let mut state = MaterializedState::new();
    insert(&mut state, &consumer("a", 1, Active));
    let op = state
        .prepare_transition(&unit(), &"a".into(), Active, Finished, None)
        .unwrap()
        .unwrap();
    state.apply(&op).unwrap();
    insert(&mut state, &consumer("b", 2, Active));

    assert_eq!(state.prune_terminal(ts()), 0);
    assert_eq!(state.all_consumers(&unit()).len(), 2);
}

#[test]
fn from_units_rebuilds_order_index() {
    let mut state = MaterializedState::new();
    insert(&mut state, &consumer("a", 1, Active));
    insert(&mut state, &consumer("b", 2, Blocked));
    let record = state.unit(&unit()).unwrap().clone();

    let json = serde_json::to_string(&record).unwrap();
    let restored: UnitRecord = serde_json::from_str(&json).unwrap();
    let rebuilt = MaterializedState::from_units([(unit(), restored)]);

    assert_eq!(rebuilt.view(&unit()), state.view(&unit()));
}
