// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer records and their state machine
//!
//! A consumer is one registration against a constraint unit. Its state only
//! ever moves forward:
//!
//! ```text
//! (new) ──► BLOCKED ──► ACTIVE ──► FINISHED
//!   │          │
//!   │          └──────► REJECTED
//!   └──────────────────► ACTIVE
//! ```
//!
//! Every store consults [`ConsumerState::can_transition_to`] before writing,
//! so an illegal move such as `FINISHED → ACTIVE` is rejected at the source
//! of truth rather than by convention.

use crate::unit::{ConstraintUnit, ConsumerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Admission state of a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    /// Holds its permits; may perform the protected operation
    Active,
    /// Queued behind other consumers, waiting for promotion
    Blocked,
    /// Admission denied or abandoned; terminal
    Rejected,
    /// Released its permits; terminal
    Finished,
}

impl ConsumerState {
    /// Whether a freshly registered consumer may start in this state
    pub fn is_initial(self) -> bool {
        matches!(self, ConsumerState::Active | ConsumerState::Blocked)
    }

    /// Terminal consumers never change again and may be archived
    pub fn is_terminal(self) -> bool {
        matches!(self, ConsumerState::Rejected | ConsumerState::Finished)
    }

    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(self, next: ConsumerState) -> bool {
        use ConsumerState::*;
        match (self, next) {
            (Blocked, Active) | (Blocked, Rejected) | (Active, Finished) => true,
            (Active, _) | (Blocked, _) | (Rejected, _) | (Finished, _) => false,
        }
    }

    /// Validate `self → next`, for use with `?`
    pub fn transition(self, next: ConsumerState) -> Result<ConsumerState, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConsumerState::Active => "active",
            ConsumerState::Blocked => "blocked",
            ConsumerState::Rejected => "rejected",
            ConsumerState::Finished => "finished",
        }
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsumerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(ConsumerState::Active),
            "blocked" => Ok(ConsumerState::Blocked),
            "rejected" => Ok(ConsumerState::Rejected),
            "finished" => Ok(ConsumerState::Finished),
            other => Err(format!("unknown consumer state: {}", other)),
        }
    }
}

/// An illegal state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal consumer transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: ConsumerState,
    pub to: ConsumerState,
}

/// How blocked consumers are picked when capacity frees up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Strict registration order; a head that does not fit blocks the rest
    #[default]
    Fifo,
    /// Admit any waiting consumer that fits, in registration order
    Asap,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Fifo => f.write_str("fifo"),
            Strategy::Asap => f.write_str("asap"),
        }
    }
}

/// One registration attempt ("ticket") against a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    pub unit: ConstraintUnit,
    pub consumer_id: ConsumerId,
    /// Capacity requested; always positive
    pub permits: u32,
    /// FIFO position, unique and increasing within the unit
    pub order: u64,
    pub state: ConsumerState,
    /// Caller-supplied passthrough data
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Consumer {
    pub fn new(
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
        permits: u32,
        order: u64,
        state: ConsumerState,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            unit,
            consumer_id,
            permits,
            order,
            state,
            context: BTreeMap::new(),
            created_at,
        }
    }

    pub fn with_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.context = context;
        self
    }

    pub fn is_active(&self) -> bool {
        self.state == ConsumerState::Active
    }

    pub fn is_blocked(&self) -> bool {
        self.state == ConsumerState::Blocked
    }
}

/// Sum of permits held by the active consumers in `consumers`
pub fn active_permits<'a>(consumers: impl IntoIterator<Item = &'a Consumer>) -> u64 {
    consumers
        .into_iter()
        .filter(|c| c.is_active())
        .map(|c| u64::from(c.permits))
        .sum()
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
