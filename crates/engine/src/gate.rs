// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Suspending callers until they are admitted
//!
//! A blocked caller holds no thread. [`StepGate`] parks a oneshot keyed by
//! `(unit, consumer_id)` and waits for whichever comes first: a promotion
//! delivered through [`StepGate::on_promoted`], or the next poll of the
//! store. Both paths re-read the consumer before proceeding, so a stale or
//! duplicate delivery never admits anyone.
//!
//! Dropping an `acquire` or `run` future part way (a timeout, a `select!`
//! that went the other way, an aborted task) gives the registration up in
//! the background: a blocked consumer is cancelled and an admitted one is
//! released. Callers about to exit should `abandon` explicitly instead,
//! since the background task dies with the runtime.

use crate::bus::{EventBus, EventReceiver};
use crate::config::GateConfig;
use crate::constraints::Constraints;
use crate::error::{ConstraintError, GateError};
use crate::notify::PromotionNotifier;
use rc_core::{Clock, ConstraintEvent, ConstraintUnit, ConsumerId, ConsumerState};
use rc_storage::ConsumerStore;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type WaiterKey = (ConstraintUnit, ConsumerId);
type Waiters = HashMap<WaiterKey, Vec<oneshot::Sender<()>>>;

/// What a caller asks the gate for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRequest {
    pub unit: ConstraintUnit,
    pub consumer_id: ConsumerId,
    pub permits: u32,
    pub context: BTreeMap<String, String>,
}

impl GateRequest {
    pub fn new(unit: impl Into<ConstraintUnit>, consumer_id: impl Into<ConsumerId>) -> Self {
        Self {
            unit: unit.into(),
            consumer_id: consumer_id.into(),
            permits: 1,
            context: BTreeMap::new(),
        }
    }

    pub fn with_permits(mut self, permits: u32) -> Self {
        self.permits = permits;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Proof of admission; hand it back to [`StepGate::release`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "an unreleased permit holds capacity until someone releases it"]
pub struct Permit {
    pub unit: ConstraintUnit,
    pub consumer_id: ConsumerId,
}

/// Suspends and resumes callers around a constrained operation
pub struct StepGate<S, N, C> {
    constraints: Constraints<S, N, C>,
    config: GateConfig,
    waiters: Arc<Mutex<Waiters>>,
}

impl<S, N, C> Clone for StepGate<S, N, C> {
    fn clone(&self) -> Self {
        Self {
            constraints: self.constraints.clone(),
            config: self.config.clone(),
            waiters: Arc::clone(&self.waiters),
        }
    }
}

impl<S, N, C> StepGate<S, N, C>
where
    S: ConsumerStore + 'static,
    N: PromotionNotifier,
    C: Clock + 'static,
{
    pub fn new(constraints: Constraints<S, N, C>) -> Self {
        let config = constraints.config().gate.clone();
        Self {
            constraints,
            config,
            waiters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    pub fn constraints(&self) -> &Constraints<S, N, C> {
        &self.constraints
    }

    /// Register and wait until admitted
    pub async fn acquire(&self, request: &GateRequest) -> Result<Permit, GateError> {
        let guard = AbandonOnDrop::arm(self, &request.unit, &request.consumer_id);
        let admitted = self.admit(request).await;
        guard.disarm();
        admitted
    }

    /// Re-attach to a registration made earlier, possibly by another process.
    ///
    /// Uses only what the store says: active returns a permit at once,
    /// blocked waits, terminal states fail.
    pub async fn resume(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<Permit, GateError> {
        let guard = AbandonOnDrop::arm(self, unit, consumer_id);
        let admitted = self.wait(unit, consumer_id).await;
        guard.disarm();
        admitted
    }

    /// Give up a registration whatever state it reached.
    ///
    /// Blocked is cancelled, active is released (returning whoever that
    /// promoted), terminal is left alone.
    pub async fn abandon(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<Vec<ConsumerId>, GateError> {
        match self.constraints.cancel(unit, consumer_id).await {
            Ok(true) => {
                tracing::info!(%unit, %consumer_id, "abandoned while blocked");
                return Ok(Vec::new());
            }
            Ok(false) => {}
            // Dropped before the registration landed
            Err(ConstraintError::ConsumerNotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }
        // Not blocked, and promotion only ever leaves blocked, so this read
        // is final unless someone else releases first
        match self.constraints.query(unit, consumer_id)?.state {
            ConsumerState::Active => {
                tracing::info!(%unit, %consumer_id, "abandoned while active");
                Ok(self.constraints.release(unit, consumer_id).await?)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Deliver a promotion. Returns whether a parked caller was woken.
    ///
    /// The consumer must still be active in the store; a second delivery
    /// finds nobody parked and does nothing.
    pub fn on_promoted(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<bool, GateError> {
        let consumer = self.constraints.query(unit, consumer_id)?;
        if consumer.state != ConsumerState::Active {
            tracing::debug!(%unit, %consumer_id, state = %consumer.state, "stale promotion ignored");
            return Ok(false);
        }

        let key = (unit.clone(), consumer_id.clone());
        let parked = self.lock_waiters().remove(&key).unwrap_or_default();
        let woken = parked
            .into_iter()
            .fold(false, |woken, tx| tx.send(()).is_ok() || woken);
        Ok(woken)
    }

    /// Whether a caller is currently parked on this consumer
    pub fn is_parked(&self, unit: &ConstraintUnit, consumer_id: &ConsumerId) -> bool {
        self.lock_waiters()
            .get(&(unit.clone(), consumer_id.clone()))
            .is_some_and(|parked| !parked.is_empty())
    }

    pub async fn release(&self, permit: Permit) -> Result<Vec<ConsumerId>, GateError> {
        Ok(self
            .constraints
            .release(&permit.unit, &permit.consumer_id)
            .await?)
    }

    /// Acquire, run `op`, then release whether or not `op` succeeded.
    ///
    /// A failed release is reported in place of the operation's output.
    pub async fn run<F, Fut, T>(&self, request: &GateRequest, op: F) -> Result<T, GateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let permit = self.acquire(request).await?;
        let guard = AbandonOnDrop::arm(self, &permit.unit, &permit.consumer_id);
        let output = op().await;
        let released = self.release(permit).await;
        guard.disarm();
        released?;
        Ok(output)
    }

    /// Forward promotions from a bus subscription until the bus goes away
    pub fn spawn_listener(&self, mut events: EventReceiver) -> JoinHandle<()> {
        let gate = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let ConstraintEvent::Promoted { unit, consumer_id } = event else {
                    continue;
                };
                if let Err(e) = gate.on_promoted(&unit, &consumer_id) {
                    tracing::warn!(%unit, %consumer_id, error = %e, "promotion delivery failed");
                }
            }
        })
    }

    async fn admit(&self, request: &GateRequest) -> Result<Permit, GateError> {
        let GateRequest {
            unit,
            consumer_id,
            permits,
            context,
        } = request;

        let state = self
            .constraints
            .register(unit, consumer_id, *permits, context)
            .await?;
        match state {
            ConsumerState::Active => Ok(permit(unit, consumer_id)),
            ConsumerState::Blocked => {
                tracing::info!(%unit, %consumer_id, "waiting for promotion");
                self.wait(unit, consumer_id).await
            }
            ConsumerState::Rejected => Err(rejected(unit, consumer_id)),
            ConsumerState::Finished => Err(released(unit, consumer_id)),
        }
    }

    async fn wait(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<Permit, GateError> {
        let key = (unit.clone(), consumer_id.clone());
        let started = Instant::now();
        let deadline = self.config.wait_timeout.map(|timeout| started + timeout);

        loop {
            // Park before reading so a promotion between the read and the
            // park still wakes us
            let woken = self.park(&key);
            let settled = match self.settle(unit, consumer_id) {
                Ok(None) => None,
                Ok(Some(admitted)) => Some(Ok(admitted)),
                Err(e) => Some(Err(e)),
            };
            if let Some(result) = settled {
                drop(woken);
                self.unpark(&key);
                return result;
            }

            let next_poll = Instant::now() + self.config.poll_interval;
            let wake_at = deadline.map_or(next_poll, |d| d.min(next_poll));
            tokio::select! {
                _ = woken => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
            self.unpark(&key);

            if deadline.is_some_and(|d| Instant::now() >= d)
                && self.constraints.cancel(unit, consumer_id).await?
            {
                let waited = started.elapsed();
                tracing::warn!(%unit, %consumer_id, ?waited, "gave up waiting; registration cancelled");
                return Err(GateError::TimedOut {
                    unit: unit.clone(),
                    consumer_id: consumer_id.clone(),
                    waited,
                });
            }
        }
    }

    /// `Some` once admitted, `None` while still blocked
    fn settle(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<Option<Permit>, GateError> {
        match self.constraints.query(unit, consumer_id)?.state {
            ConsumerState::Active => Ok(Some(permit(unit, consumer_id))),
            ConsumerState::Blocked => Ok(None),
            ConsumerState::Rejected => Err(rejected(unit, consumer_id)),
            ConsumerState::Finished => Err(released(unit, consumer_id)),
        }
    }

    fn park(&self, key: &WaiterKey) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.lock_waiters().entry(key.clone()).or_default().push(tx);
        rx
    }

    /// Drop senders whose receivers are gone
    fn unpark(&self, key: &WaiterKey) {
        let mut waiters = self.lock_waiters();
        if let Some(parked) = waiters.get_mut(key) {
            parked.retain(|tx| !tx.is_closed());
            if parked.is_empty() {
                waiters.remove(key);
            }
        }
    }

    fn lock_waiters(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S, C> StepGate<S, EventBus, C>
where
    S: ConsumerStore + 'static,
    C: Clock + 'static,
{
    /// Subscribe to the service's own bus and deliver its promotions
    pub fn listen(&self) -> JoinHandle<()> {
        let (_, events) = self.constraints.subscribe("constraint:promoted");
        self.spawn_listener(events)
    }
}

/// Abandons a registration unless disarmed before it drops
struct AbandonOnDrop<S, N, C>
where
    S: ConsumerStore + 'static,
    N: PromotionNotifier,
    C: Clock + 'static,
{
    armed: Option<(StepGate<S, N, C>, ConstraintUnit, ConsumerId)>,
}

impl<S, N, C> AbandonOnDrop<S, N, C>
where
    S: ConsumerStore + 'static,
    N: PromotionNotifier,
    C: Clock + 'static,
{
    fn arm(gate: &StepGate<S, N, C>, unit: &ConstraintUnit, consumer_id: &ConsumerId) -> Self {
        Self {
            armed: Some((gate.clone(), unit.clone(), consumer_id.clone())),
        }
    }

    fn disarm(mut self) {
        self.armed = None;
    }
}

impl<S, N, C> Drop for AbandonOnDrop<S, N, C>
where
    S: ConsumerStore + 'static,
    N: PromotionNotifier,
    C: Clock + 'static,
{
    fn drop(&mut self) {
        let Some((gate, unit, consumer_id)) = self.armed.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%unit, %consumer_id, "dropped outside a runtime; registration left in place");
            return;
        };
        runtime.spawn(async move {
            if let Err(e) = gate.abandon(&unit, &consumer_id).await {
                tracing::warn!(%unit, %consumer_id, error = %e, "failed to abandon dropped registration");
            }
        });
    }
}

fn permit(unit: &ConstraintUnit, consumer_id: &ConsumerId) -> Permit {
    Permit {
        unit: unit.clone(),
        consumer_id: consumer_id.clone(),
    }
}

fn rejected(unit: &ConstraintUnit, consumer_id: &ConsumerId) -> GateError {
    GateError::Rejected {
        unit: unit.clone(),
        consumer_id: consumer_id.clone(),
    }
}

fn released(unit: &ConstraintUnit, consumer_id: &ConsumerId) -> GateError {
    GateError::Released {
        unit: unit.clone(),
        consumer_id: consumer_id.clone(),
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
