// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The consumer store contract

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rc_core::{active_permits, ConstraintUnit, Consumer, ConsumerId, ConsumerState};
use std::sync::Arc;

/// A consistent read of one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitView {
    pub unit: ConstraintUnit,
    /// Non-terminal consumers, ordered by `order` ascending
    pub consumers: Vec<Consumer>,
    /// Highest order ever assigned on the unit (0 if none)
    pub max_order: u64,
    /// Incremented by every successful write to the unit
    pub revision: u64,
}

impl UnitView {
    pub fn empty(unit: ConstraintUnit) -> Self {
        Self {
            unit,
            consumers: Vec::new(),
            max_order: 0,
            revision: 0,
        }
    }

    pub fn active_permits(&self) -> u64 {
        active_permits(&self.consumers)
    }

    /// Blocked consumers in FIFO order
    pub fn blocked(&self) -> impl Iterator<Item = &Consumer> {
        self.consumers.iter().filter(|c| c.is_blocked())
    }

    pub fn next_order(&self) -> u64 {
        self.max_order + 1
    }
}

/// Durable record store for consumer registrations, scoped by unit.
///
/// Writes are conditional. Passing `expected_revision` makes a write fail
/// with [`StoreError::Conflict`] if anything else touched the unit since the
/// caller's read; this per-unit compare-and-swap is the only
/// synchronization point between workers.
pub trait ConsumerStore: Send + Sync {
    /// Persist a new consumer.
    ///
    /// Fails with `DuplicateConsumer` if `(unit, consumer_id)` exists and
    /// `OrderTaken` if `(unit, order)` exists.
    fn insert(&self, consumer: &Consumer, expected_revision: Option<u64>)
        -> Result<(), StoreError>;

    /// Move a consumer from `from` to `to`.
    ///
    /// Returns `Ok(false)` if the consumer is no longer in `from`.
    fn update_state(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        from: ConsumerState,
        to: ConsumerState,
        expected_revision: Option<u64>,
    ) -> Result<bool, StoreError>;

    /// Non-terminal consumers, max order and revision in one read
    fn snapshot(&self, unit: &ConstraintUnit) -> Result<UnitView, StoreError>;

    /// A single consumer, terminal or not
    fn get(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<Option<Consumer>, StoreError>;

    /// Every retained consumer of a unit, including terminal ones
    fn consumers(&self, unit: &ConstraintUnit) -> Result<Vec<Consumer>, StoreError>;

    /// Units that have ever seen a registration
    fn units(&self) -> Result<Vec<ConstraintUnit>, StoreError>;

    /// Archive terminal consumers created before `cutoff`.
    ///
    /// Max orders and revisions are kept. Returns how many were dropped.
    fn prune_terminal(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Non-terminal consumers ordered by `order` ascending
    fn list_by_unit(&self, unit: &ConstraintUnit) -> Result<Vec<Consumer>, StoreError> {
        Ok(self.snapshot(unit)?.consumers)
    }

    /// Highest assigned order for the unit, or 0 if none
    fn max_order(&self, unit: &ConstraintUnit) -> Result<u64, StoreError> {
        Ok(self.snapshot(unit)?.max_order)
    }
}

impl<S: ConsumerStore + ?Sized> ConsumerStore for Arc<S> {
    fn insert(
        &self,
        consumer: &Consumer,
        expected_revision: Option<u64>,
    ) -> Result<(), StoreError> {
        (**self).insert(consumer, expected_revision)
    }

    fn update_state(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        from: ConsumerState,
        to: ConsumerState,
        expected_revision: Option<u64>,
    ) -> Result<bool, StoreError> {
        (**self).update_state(unit, consumer_id, from, to, expected_revision)
    }

    fn snapshot(&self, unit: &ConstraintUnit) -> Result<UnitView, StoreError> {
        (**self).snapshot(unit)
    }

    fn get(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<Option<Consumer>, StoreError> {
        (**self).get(unit, consumer_id)
    }

    fn consumers(&self, unit: &ConstraintUnit) -> Result<Vec<Consumer>, StoreError> {
        (**self).consumers(unit)
    }

    fn units(&self) -> Result<Vec<ConstraintUnit>, StoreError> {
        (**self).units()
    }

    fn prune_terminal(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        (**self).prune_terminal(cutoff)
    }
}
