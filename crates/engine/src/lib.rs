// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rc-engine: admission control over a consumer store
//!
//! - [`Constraints`] - register, release, query and max order by unit
//! - [`ConstraintHandle`] - the same calls bound to one unit
//! - [`StepGate`] - suspends callers until they are admitted
//! - [`MaintenanceTask`] - repairs stranded queues and archives old records

pub mod admission;
mod bus;
pub mod config;
mod constraints;
mod error;
mod gate;
mod handle;
mod maintenance;
mod notify;

pub use admission::{decide, plan_promotions, AdmissionEngine};
pub use bus::{EventBus, EventPattern, EventReceiver, EventSender, SubscriberId};
pub use config::{
    AdmissionConfig, Config, ConfigError, ConstraintRule, ConstraintSpec, GateConfig,
    MaintenanceConfig, StoreConfig,
};
pub use constraints::Constraints;
pub use error::{ConstraintError, GateError};
pub use gate::{GateRequest, Permit, StepGate};
pub use handle::ConstraintHandle;
pub use maintenance::{spawn_maintenance, MaintenanceReport, MaintenanceTask};
pub use notify::{NoOpNotifier, PromotionNotifier, TracedNotifier};
