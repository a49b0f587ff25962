// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rc-core: data model for resource constraints
//!
//! This crate provides:
//! - Identifiers for constraint units and consumers
//! - The consumer record and its closed state machine
//! - Promotion strategies and constraint events
//! - Clock and ID generation abstractions for testability

pub mod clock;
pub mod consumer;
pub mod event;
pub mod id;
pub mod unit;

pub use clock::{Clock, FakeClock, SystemClock};
pub use consumer::{active_permits, Consumer, ConsumerState, Strategy, TransitionError};
pub use event::ConstraintEvent;
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use unit::{ConstraintUnit, ConsumerId};
