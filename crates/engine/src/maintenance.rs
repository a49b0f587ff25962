// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic maintenance sweep
//!
//! Each tick reconciles stranded queues and archives terminal consumers
//! older than the retention window. Losing a tick is harmless: the sweep
//! only repeats work a release would have done.

use crate::config::MaintenanceConfig;
use crate::constraints::Constraints;
use crate::error::ConstraintError;
use crate::notify::PromotionNotifier;
use rc_core::Clock;
use rc_storage::ConsumerStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub units_scanned: usize,
    pub promoted: usize,
    /// Terminal consumers archived
    pub pruned: usize,
}

pub struct MaintenanceTask<S, N, C> {
    constraints: Constraints<S, N, C>,
    config: MaintenanceConfig,
}

impl<S, N, C> MaintenanceTask<S, N, C>
where
    S: ConsumerStore,
    N: PromotionNotifier,
    C: Clock,
{
    pub fn new(constraints: Constraints<S, N, C>) -> Self {
        let config = constraints.config().maintenance.clone();
        Self {
            constraints,
            config,
        }
    }

    pub fn with_config(mut self, config: MaintenanceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    /// Run one sweep
    pub async fn tick(&self) -> Result<MaintenanceReport, ConstraintError> {
        let mut report = self.constraints.reconcile().await?;

        if let Some(retain) = self.config.retain_terminal {
            let now = self.constraints.clock().now();
            let cutoff = chrono::Duration::from_std(retain)
                .ok()
                .and_then(|window| now.checked_sub_signed(window));
            match cutoff {
                Some(cutoff) => {
                    report.pruned = self.constraints.store().prune_terminal(cutoff)?;
                }
                None => tracing::debug!(?retain, "retention window out of range; nothing pruned"),
            }
        }

        tracing::debug!(
            units = report.units_scanned,
            promoted = report.promoted,
            pruned = report.pruned,
            "maintenance sweep complete"
        );
        Ok(report)
    }
}

/// Run `task` every `interval` until `shutdown` flips to true or its sender drops
pub fn spawn_maintenance<S, N, C>(
    task: MaintenanceTask<S, N, C>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: ConsumerStore + 'static,
    N: PromotionNotifier,
    C: Clock + 'static,
{
    tokio::spawn(async move {
        let mut timer = interval(task.config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = task.tick().await {
                        tracing::warn!(error = %e, "maintenance sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("maintenance stopped");
    })
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
