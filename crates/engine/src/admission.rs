// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission decisions and promotion
//!
//! The decisions themselves ([`decide`], [`plan_promotions`]) are pure
//! functions over a [`UnitView`]. [`AdmissionEngine`] drives them against a
//! store: read a view, decide, write conditionally on the view's revision,
//! and re-read when another worker got there first.

use crate::config::{AdmissionConfig, ConstraintSpec};
use crate::error::ConstraintError;
use crate::notify::PromotionNotifier;
use rc_core::{
    Clock, ConstraintEvent, ConstraintUnit, Consumer, ConsumerId, ConsumerState, Strategy,
};
use rc_storage::{ConsumerStore, StoreError, UnitView};
use std::collections::BTreeMap;

/// State a new registration enters given the current view
pub fn decide(view: &UnitView, permits: u32, spec: &ConstraintSpec) -> ConsumerState {
    let fits = view.active_permits() + u64::from(permits) <= spec.capacity;
    // Under FIFO a newcomer never overtakes a consumer already waiting
    let queue_empty = spec.strategy == Strategy::Asap || view.blocked().next().is_none();
    if fits && queue_empty {
        ConsumerState::Active
    } else {
        ConsumerState::Blocked
    }
}

/// Blocked consumers that fit in the free capacity, in promotion order
pub fn plan_promotions(view: &UnitView, spec: &ConstraintSpec) -> Vec<ConsumerId> {
    let mut active = view.active_permits();
    let mut plan = Vec::new();
    for candidate in view.blocked() {
        let permits = u64::from(candidate.permits);
        if active + permits <= spec.capacity {
            active += permits;
            plan.push(candidate.consumer_id.clone());
        } else if spec.strategy == Strategy::Fifo {
            break;
        }
    }
    plan
}

/// Drives admission decisions against a consumer store
pub struct AdmissionEngine<S, N, C> {
    store: S,
    notifier: N,
    clock: C,
    config: AdmissionConfig,
}

impl<S, N, C> AdmissionEngine<S, N, C>
where
    S: ConsumerStore,
    N: PromotionNotifier,
    C: Clock,
{
    pub fn new(store: S, notifier: N, clock: C, config: AdmissionConfig) -> Self {
        Self {
            store,
            notifier,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Register a consumer and return the state and order it was given.
    ///
    /// Contention (another worker took the order, or wrote to the unit since
    /// our read) is retried up to `max_register_attempts` times.
    pub async fn decide_admission(
        &self,
        unit: &ConstraintUnit,
        spec: &ConstraintSpec,
        consumer_id: &ConsumerId,
        permits: u32,
        context: &BTreeMap<String, String>,
    ) -> Result<(ConsumerState, u64), ConstraintError> {
        if permits == 0 {
            return Err(ConstraintError::InvalidPermits { permits });
        }
        if u64::from(permits) > spec.capacity {
            return Err(ConstraintError::PermanentlyBlocked {
                unit: unit.clone(),
                permits,
                capacity: spec.capacity,
            });
        }

        let attempts = self.config.max_register_attempts;
        for attempt in 1..=attempts {
            let mut view = self.store.snapshot(unit)?;
            // Blocked consumers that already fit were stranded by a release
            // whose promotions never ran. They go before the newcomer.
            if !plan_promotions(&view, spec).is_empty() {
                self.promote_pending(unit, spec).await?;
                view = self.store.snapshot(unit)?;
            }
            let state = decide(&view, permits, spec);
            let consumer = Consumer::new(
                unit.clone(),
                consumer_id.clone(),
                permits,
                view.next_order(),
                state,
                self.clock.now(),
            )
            .with_context(context.clone());

            match self.store.insert(&consumer, Some(view.revision)) {
                Ok(()) => {}
                Err(e) if e.is_contention() => {
                    tracing::debug!(
                        %unit,
                        %consumer_id,
                        attempt,
                        error = %e,
                        "registration lost a race; retrying"
                    );
                    continue;
                }
                Err(e) => return Err(ConstraintError::from_store(e)),
            }

            tracing::info!(
                %unit,
                %consumer_id,
                order = consumer.order,
                permits,
                state = %state,
                "consumer registered"
            );
            self.notifier
                .notify(ConstraintEvent::Registered {
                    unit: unit.clone(),
                    consumer_id: consumer_id.clone(),
                    state,
                    order: consumer.order,
                })
                .await;

            return Ok((state, consumer.order));
        }

        Err(ConstraintError::UnableToRegister {
            unit: unit.clone(),
            consumer_id: consumer_id.clone(),
            attempts,
        })
    }

    /// Finish an active consumer and promote whoever now fits.
    ///
    /// Releasing a consumer that is not active is a no-op returning no
    /// promotions, so duplicate releases are harmless.
    pub async fn promote_on_release(
        &self,
        unit: &ConstraintUnit,
        spec: &ConstraintSpec,
        consumer_id: &ConsumerId,
    ) -> Result<Vec<ConsumerId>, ConstraintError> {
        let finished = self
            .store
            .update_state(
                unit,
                consumer_id,
                ConsumerState::Active,
                ConsumerState::Finished,
                None,
            )
            .map_err(ConstraintError::from_store)?;
        if !finished {
            tracing::debug!(%unit, %consumer_id, "release of inactive consumer ignored");
            return Ok(Vec::new());
        }

        tracing::info!(%unit, %consumer_id, "consumer released");
        self.notifier
            .notify(ConstraintEvent::Finished {
                unit: unit.clone(),
                consumer_id: consumer_id.clone(),
            })
            .await;

        self.promote_pending(unit, spec).await
    }

    /// Promote blocked consumers that fit, without releasing anyone.
    ///
    /// Each promotion is conditional on the revision of the view it was
    /// planned from; a conflict re-reads and re-plans. When the budget runs
    /// out the promotions made so far are returned and the rest is left to
    /// the next release or maintenance sweep.
    pub async fn promote_pending(
        &self,
        unit: &ConstraintUnit,
        spec: &ConstraintSpec,
    ) -> Result<Vec<ConsumerId>, ConstraintError> {
        let mut promoted = Vec::new();
        let attempts = self.config.max_promotion_attempts;

        for attempt in 1..=attempts {
            let view = self.store.snapshot(unit)?;
            let plan = plan_promotions(&view, spec);
            if plan.is_empty() {
                return Ok(promoted);
            }

            let mut revision = view.revision;
            let mut conflicted = false;
            for candidate in plan {
                match self.store.update_state(
                    unit,
                    &candidate,
                    ConsumerState::Blocked,
                    ConsumerState::Active,
                    Some(revision),
                ) {
                    Ok(true) => {
                        revision += 1;
                        tracing::info!(%unit, consumer_id = %candidate, "consumer promoted");
                        self.notifier
                            .notify(ConstraintEvent::Promoted {
                                unit: unit.clone(),
                                consumer_id: candidate.clone(),
                            })
                            .await;
                        promoted.push(candidate);
                    }
                    Ok(false) => {
                        conflicted = true;
                        break;
                    }
                    Err(e) if e.is_contention() => {
                        conflicted = true;
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            if !conflicted {
                return Ok(promoted);
            }
            tracing::debug!(%unit, attempt, "promotion scan conflicted; re-reading");
        }

        tracing::warn!(
            %unit,
            attempts,
            promoted = promoted.len(),
            "promotion budget exhausted; leaving the rest to maintenance"
        );
        Ok(promoted)
    }

    /// Abandon a blocked consumer. Returns whether it was still blocked.
    pub async fn cancel(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<bool, ConstraintError> {
        let rejected = self
            .store
            .update_state(
                unit,
                consumer_id,
                ConsumerState::Blocked,
                ConsumerState::Rejected,
                None,
            )
            .map_err(ConstraintError::from_store)?;

        if rejected {
            tracing::info!(%unit, %consumer_id, "consumer cancelled");
            self.notifier
                .notify(ConstraintEvent::Rejected {
                    unit: unit.clone(),
                    consumer_id: consumer_id.clone(),
                })
                .await;
        }
        Ok(rejected)
    }

    /// Current record of a consumer
    pub fn query(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<Consumer, ConstraintError> {
        self.store
            .get(unit, consumer_id)?
            .ok_or_else(|| ConstraintError::ConsumerNotFound {
                unit: unit.clone(),
                consumer_id: consumer_id.clone(),
            })
    }

    /// Whether the unit has blocked consumers that already fit
    pub fn has_pending(
        &self,
        unit: &ConstraintUnit,
        spec: &ConstraintSpec,
    ) -> Result<bool, StoreError> {
        let view = self.store.snapshot(unit)?;
        Ok(!plan_promotions(&view, spec).is_empty())
    }
}

#[cfg(test)]
#[path = "admission_tests.rs"]
mod tests;
