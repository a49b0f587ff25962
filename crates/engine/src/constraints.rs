// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The resource constraint service
//!
//! [`Constraints`] is the surface callers use: register, release, query and
//! max order, keyed by unit. Capacity and strategy come from [`Config`] and
//! are resolved per call, so a unit needs no setup before its first
//! registration.

use crate::admission::AdmissionEngine;
use crate::bus::{EventBus, EventReceiver, SubscriberId};
use crate::config::{Config, ConstraintSpec};
use crate::error::ConstraintError;
use crate::handle::ConstraintHandle;
use crate::maintenance::MaintenanceReport;
use crate::notify::PromotionNotifier;
use rc_core::{Clock, ConstraintUnit, Consumer, ConsumerId, ConsumerState};
use rc_storage::ConsumerStore;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Admission control over every unit in one store
pub struct Constraints<S, N, C> {
    engine: Arc<AdmissionEngine<S, N, C>>,
    config: Arc<Config>,
}

impl<S, N, C> Clone for Constraints<S, N, C> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, N, C> Constraints<S, N, C>
where
    S: ConsumerStore,
    N: PromotionNotifier,
    C: Clock,
{
    pub fn new(store: S, notifier: N, clock: C, config: Config) -> Self {
        let engine = AdmissionEngine::new(store, notifier, clock, config.admission.clone());
        Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &AdmissionEngine<S, N, C> {
        &self.engine
    }

    pub fn store(&self) -> &S {
        self.engine.store()
    }

    pub fn notifier(&self) -> &N {
        self.engine.notifier()
    }

    pub fn clock(&self) -> &C {
        self.engine.clock()
    }

    pub fn spec_for(&self, unit: &ConstraintUnit) -> ConstraintSpec {
        self.config.spec_for(unit)
    }

    /// Handle bound to `unit` with its configured capacity
    pub fn handle(&self, unit: &ConstraintUnit) -> ConstraintHandle<S, N, C> {
        ConstraintHandle::new(Arc::clone(&self.engine), unit.clone(), self.spec_for(unit))
    }

    pub async fn register(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        permits: u32,
        context: &BTreeMap<String, String>,
    ) -> Result<ConsumerState, ConstraintError> {
        self.handle(unit)
            .register(consumer_id, permits, context)
            .await
    }

    pub async fn release(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<Vec<ConsumerId>, ConstraintError> {
        self.handle(unit).release(consumer_id).await
    }

    pub fn query(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<Consumer, ConstraintError> {
        self.engine.query(unit, consumer_id)
    }

    pub fn max_order(&self, unit: &ConstraintUnit) -> Result<u64, ConstraintError> {
        Ok(self.engine.store().max_order(unit)?)
    }

    pub async fn cancel(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<bool, ConstraintError> {
        self.handle(unit).cancel(consumer_id).await
    }

    pub fn consumers(&self, unit: &ConstraintUnit) -> Result<Vec<Consumer>, ConstraintError> {
        Ok(self.engine.store().consumers(unit)?)
    }

    pub fn units(&self) -> Result<Vec<ConstraintUnit>, ConstraintError> {
        Ok(self.engine.store().units()?)
    }

    /// Promote blocked consumers that already fit, across every unit.
    ///
    /// Repairs units where a worker finished a consumer but died before
    /// promoting the queue.
    pub async fn reconcile(&self) -> Result<MaintenanceReport, ConstraintError> {
        let mut report = MaintenanceReport::default();
        for unit in self.units()? {
            report.units_scanned += 1;
            let spec = self.spec_for(&unit);
            if !self.engine.has_pending(&unit, &spec)? {
                continue;
            }
            let promoted = self.engine.promote_pending(&unit, &spec).await?;
            if !promoted.is_empty() {
                tracing::info!(%unit, promoted = promoted.len(), "reconciled stranded queue");
            }
            report.promoted += promoted.len();
        }
        Ok(report)
    }
}

impl<S, C> Constraints<S, EventBus, C>
where
    S: ConsumerStore,
    C: Clock,
{
    /// Subscribe to constraint events by name pattern, e.g. `constraint:promoted`
    pub fn subscribe(&self, pattern: &str) -> (SubscriberId, EventReceiver) {
        self.notifier().subscribe(pattern)
    }
}

#[cfg(test)]
#[path = "constraints_tests.rs"]
mod tests;
