// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized consumer state
//!
//! Both stores keep their records in a [`MaterializedState`]. Writes follow
//! a prepare/apply split: `prepare_*` checks a request against current state
//! and turns it into an [`Operation`], the store persists the operation (the
//! WAL store appends it to disk), then `apply` folds it in. Replaying the
//! same operations always rebuilds the same state, revisions included.

use crate::error::StoreError;
use crate::store::UnitView;
use crate::wal::operation::{ConsumerInsertOp, ConsumerTransitionOp, Operation};
use chrono::{DateTime, Utc};
use rc_core::{ConstraintUnit, Consumer, ConsumerId, ConsumerState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Error applying an operation to state
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("entity not found: consumer {unit}/{consumer_id}")]
    NotFound {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
    },
    #[error("entity already exists: consumer {unit}/{consumer_id}")]
    AlreadyExists {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
    },
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),
}

/// Every record of one unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub consumers: BTreeMap<ConsumerId, Consumer>,
    /// Order index over `consumers`
    #[serde(skip)]
    pub by_order: BTreeMap<u64, ConsumerId>,
    /// Survives archival so orders are never reused
    pub max_order: u64,
    pub revision: u64,
}

impl UnitRecord {
    fn reindex(&mut self) {
        self.by_order = self
            .consumers
            .values()
            .map(|c| (c.order, c.consumer_id.clone()))
            .collect();
    }

    /// Consumers in order, terminal ones included
    pub fn ordered(&self) -> impl Iterator<Item = &Consumer> {
        self.by_order
            .values()
            .filter_map(|id| self.consumers.get(id))
    }
}

/// In-memory image of the store, rebuilt from operations
#[derive(Debug, Clone, Default)]
pub struct MaterializedState {
    units: HashMap<ConstraintUnit, UnitRecord>,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from per-unit records (e.g. loaded from a snapshot)
    pub fn from_units(units: impl IntoIterator<Item = (ConstraintUnit, UnitRecord)>) -> Self {
        let units = units
            .into_iter()
            .map(|(unit, mut record)| {
                record.reindex();
                (unit, record)
            })
            .collect();
        Self { units }
    }

    pub fn unit(&self, unit: &ConstraintUnit) -> Option<&UnitRecord> {
        self.units.get(unit)
    }

    pub fn units(&self) -> impl Iterator<Item = (&ConstraintUnit, &UnitRecord)> {
        self.units.iter()
    }

    pub fn consumer(&self, unit: &ConstraintUnit, consumer_id: &ConsumerId) -> Option<&Consumer> {
        self.units.get(unit)?.consumers.get(consumer_id)
    }

    pub fn revision(&self, unit: &ConstraintUnit) -> u64 {
        self.units.get(unit).map_or(0, |r| r.revision)
    }

    /// Consistent view of a unit's non-terminal consumers
    pub fn view(&self, unit: &ConstraintUnit) -> UnitView {
        let Some(record) = self.units.get(unit) else {
            return UnitView::empty(unit.clone());
        };
        UnitView {
            unit: unit.clone(),
            consumers: record
                .ordered()
                .filter(|c| !c.state.is_terminal())
                .cloned()
                .collect(),
            max_order: record.max_order,
            revision: record.revision,
        }
    }

    /// All retained consumers of a unit, in order
    pub fn all_consumers(&self, unit: &ConstraintUnit) -> Vec<Consumer> {
        self.units
            .get(unit)
            .map(|r| r.ordered().cloned().collect())
            .unwrap_or_default()
    }

    /// Unit names, sorted for stable output
    pub fn unit_names(&self) -> Vec<ConstraintUnit> {
        let mut names: Vec<_> = self.units.keys().cloned().collect();
        names.sort();
        names
    }

    fn check_revision(&self, unit: &ConstraintUnit, expected: Option<u64>) -> Result<(), StoreError> {
        let actual = self.revision(unit);
        match expected {
            Some(expected) if expected != actual => Err(StoreError::Conflict {
                unit: unit.clone(),
                expected,
                actual,
            }),
            _ => Ok(()),
        }
    }

    /// Validate an insert and turn it into an operation
    pub fn prepare_insert(
        &self,
        consumer: &Consumer,
        expected_revision: Option<u64>,
    ) -> Result<Operation, StoreError> {
        if !consumer.state.is_initial() {
            return Err(StoreError::InvalidInitialState(consumer.state));
        }
        if consumer.permits == 0 {
            return Err(StoreError::ZeroPermits {
                consumer_id: consumer.consumer_id.clone(),
            });
        }
        if let Some(record) = self.units.get(&consumer.unit) {
            if record.consumers.contains_key(&consumer.consumer_id) {
                return Err(StoreError::DuplicateConsumer {
                    unit: consumer.unit.clone(),
                    consumer_id: consumer.consumer_id.clone(),
                });
            }
            if consumer.order <= record.max_order {
                return Err(StoreError::OrderTaken {
                    unit: consumer.unit.clone(),
                    order: consumer.order,
                });
            }
        }
        self.check_revision(&consumer.unit, expected_revision)?;

        Ok(Operation::ConsumerInsert(ConsumerInsertOp {
            consumer: consumer.clone(),
        }))
    }

    /// Validate a state change.
    ///
    /// Returns `Ok(None)` when the consumer is no longer in `from`; that is
    /// a lost race, not an error.
    pub fn prepare_transition(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        from: ConsumerState,
        to: ConsumerState,
        expected_revision: Option<u64>,
    ) -> Result<Option<Operation>, StoreError> {
        from.transition(to)?;

        let current = self
            .consumer(unit, consumer_id)
            .ok_or_else(|| StoreError::NotFound {
                unit: unit.clone(),
                consumer_id: consumer_id.clone(),
            })?;
        if current.state != from {
            return Ok(None);
        }
        self.check_revision(unit, expected_revision)?;

        Ok(Some(Operation::ConsumerTransition(ConsumerTransitionOp {
            unit: unit.clone(),
            consumer_id: consumer_id.clone(),
            from,
            to,
        })))
    }

    /// Apply an operation to update the state
    pub fn apply(&mut self, op: &Operation) -> Result<(), ApplyError> {
        match op {
            Operation::ConsumerInsert(ConsumerInsertOp { consumer }) => {
                let record = self.units.entry(consumer.unit.clone()).or_default();
                if record.consumers.contains_key(&consumer.consumer_id) {
                    return Err(ApplyError::AlreadyExists {
                        unit: consumer.unit.clone(),
                        consumer_id: consumer.consumer_id.clone(),
                    });
                }
                record.max_order = record.max_order.max(consumer.order);
                record
                    .by_order
                    .insert(consumer.order, consumer.consumer_id.clone());
                record
                    .consumers
                    .insert(consumer.consumer_id.clone(), consumer.clone());
                record.revision += 1;
            }

            Operation::ConsumerTransition(ConsumerTransitionOp {
                unit,
                consumer_id,
                from,
                to,
            }) => {
                let record = self.units.get_mut(unit).ok_or_else(|| ApplyError::NotFound {
                    unit: unit.clone(),
                    consumer_id: consumer_id.clone(),
                })?;
                let consumer =
                    record
                        .consumers
                        .get_mut(consumer_id)
                        .ok_or_else(|| ApplyError::NotFound {
                            unit: unit.clone(),
                            consumer_id: consumer_id.clone(),
                        })?;
                if consumer.state != *from || !from.can_transition_to(*to) {
                    return Err(ApplyError::InvalidTransition(format!(
                        "{}/{}: recorded {} -> {}, current {}",
                        unit, consumer_id, from, to, consumer.state
                    )));
                }
                consumer.state = *to;
                record.revision += 1;
            }

            Operation::SnapshotTaken { .. } => {}
        }

        Ok(())
    }

    /// Drop terminal consumers created before `cutoff`.
    ///
    /// Unit records stay behind (with their max order and revision) even
    /// when emptied, so orders are never handed out twice.
    pub fn prune_terminal(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for record in self.units.values_mut() {
            let before = record.consumers.len();
            record
                .consumers
                .retain(|_, c| !(c.state.is_terminal() && c.created_at < cutoff));
            let pruned = before - record.consumers.len();
            if pruned > 0 {
                record.reindex();
                removed += pruned;
            }
        }
        removed
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
