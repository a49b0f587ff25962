// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process consumer store

use crate::error::StoreError;
use crate::state::MaterializedState;
use crate::store::{ConsumerStore, UnitView};
use chrono::{DateTime, Utc};
use rc_core::{ConstraintUnit, Consumer, ConsumerId, ConsumerState};
use std::sync::{Arc, Mutex, MutexGuard};

/// Consumer store shared by the threads of one process.
///
/// Clones share the same records, so a clone behaves like a second worker
/// pointed at the same database.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MaterializedState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MaterializedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ConsumerStore for MemoryStore {
    fn insert(
        &self,
        consumer: &Consumer,
        expected_revision: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let op = state.prepare_insert(consumer, expected_revision)?;
        state.apply(&op)?;
        Ok(())
    }

    fn update_state(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        from: ConsumerState,
        to: ConsumerState,
        expected_revision: Option<u64>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        match state.prepare_transition(unit, consumer_id, from, to, expected_revision)? {
            Some(op) => {
                state.apply(&op)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn snapshot(&self, unit: &ConstraintUnit) -> Result<UnitView, StoreError> {
        Ok(self.lock().view(unit))
    }

    fn get(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<Option<Consumer>, StoreError> {
        Ok(self.lock().consumer(unit, consumer_id).cloned())
    }

    fn consumers(&self, unit: &ConstraintUnit) -> Result<Vec<Consumer>, StoreError> {
        Ok(self.lock().all_consumers(unit))
    }

    fn units(&self) -> Result<Vec<ConstraintUnit>, StoreError> {
        Ok(self.lock().unit_names())
    }

    fn prune_terminal(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.lock().prune_terminal(cutoff))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
