// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A constraint bound to one unit

use crate::admission::AdmissionEngine;
use crate::config::ConstraintSpec;
use crate::error::ConstraintError;
use crate::notify::PromotionNotifier;
use rc_core::{Clock, ConstraintUnit, Consumer, ConsumerId, ConsumerState};
use rc_storage::ConsumerStore;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One unit with its resolved capacity and strategy.
///
/// Handles are cheap to clone and hold no state of their own; every call
/// goes back to the store.
pub struct ConstraintHandle<S, N, C> {
    engine: Arc<AdmissionEngine<S, N, C>>,
    unit: ConstraintUnit,
    spec: ConstraintSpec,
}

impl<S, N, C> Clone for ConstraintHandle<S, N, C> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            unit: self.unit.clone(),
            spec: self.spec,
        }
    }
}

impl<S, N, C> ConstraintHandle<S, N, C>
where
    S: ConsumerStore,
    N: PromotionNotifier,
    C: Clock,
{
    pub fn new(
        engine: Arc<AdmissionEngine<S, N, C>>,
        unit: ConstraintUnit,
        spec: ConstraintSpec,
    ) -> Self {
        Self { engine, unit, spec }
    }

    pub fn unit(&self) -> &ConstraintUnit {
        &self.unit
    }

    pub fn spec(&self) -> &ConstraintSpec {
        &self.spec
    }

    /// Register a consumer; `Active` means proceed, `Blocked` means wait
    pub async fn register(
        &self,
        consumer_id: &ConsumerId,
        permits: u32,
        context: &BTreeMap<String, String>,
    ) -> Result<ConsumerState, ConstraintError> {
        let (state, _order) = self
            .engine
            .decide_admission(&self.unit, &self.spec, consumer_id, permits, context)
            .await?;
        Ok(state)
    }

    /// Release an active consumer, returning who was promoted
    pub async fn release(
        &self,
        consumer_id: &ConsumerId,
    ) -> Result<Vec<ConsumerId>, ConstraintError> {
        self.engine
            .promote_on_release(&self.unit, &self.spec, consumer_id)
            .await
    }

    pub fn query(&self, consumer_id: &ConsumerId) -> Result<Consumer, ConstraintError> {
        self.engine.query(&self.unit, consumer_id)
    }

    /// Abandon a blocked consumer.
    ///
    /// Cancelling the head of a FIFO queue can uncover consumers that fit,
    /// so they are promoted before returning.
    pub async fn cancel(&self, consumer_id: &ConsumerId) -> Result<bool, ConstraintError> {
        let cancelled = self.engine.cancel(&self.unit, consumer_id).await?;
        if cancelled && self.engine.has_pending(&self.unit, &self.spec)? {
            self.engine.promote_pending(&self.unit, &self.spec).await?;
        }
        Ok(cancelled)
    }

    pub fn max_order(&self) -> Result<u64, ConstraintError> {
        Ok(self.engine.store().max_order(&self.unit)?)
    }

    /// Every retained consumer, terminal ones included, in order
    pub fn consumers(&self) -> Result<Vec<Consumer>, ConstraintError> {
        Ok(self.engine.store().consumers(&self.unit)?)
    }
}
