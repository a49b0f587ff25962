// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for admission control

use rc_core::{ConstraintUnit, ConsumerId};
use rc_storage::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`Constraints`](crate::Constraints) operations
#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error("permits must be positive, got {permits}")]
    InvalidPermits { permits: u32 },
    #[error("{unit} can never admit {permits} permits (capacity {capacity})")]
    PermanentlyBlocked {
        unit: ConstraintUnit,
        permits: u32,
        capacity: u64,
    },
    #[error("unable to register {consumer_id} on {unit} after {attempts} attempts")]
    UnableToRegister {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
        attempts: u32,
    },
    #[error("consumer {consumer_id} already registered on {unit}")]
    DuplicateConsumer {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
    },
    #[error("consumer {consumer_id} not found on {unit}")]
    ConsumerNotFound {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
    },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ConstraintError {
    /// Whether retrying the whole call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ConstraintError::UnableToRegister { .. })
    }

    /// Lift store errors that have a direct admission meaning
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateConsumer { unit, consumer_id } => {
                ConstraintError::DuplicateConsumer { unit, consumer_id }
            }
            StoreError::NotFound { unit, consumer_id } => {
                ConstraintError::ConsumerNotFound { unit, consumer_id }
            }
            other => ConstraintError::Store(other),
        }
    }
}

/// Errors from the step gate
#[derive(Debug, Error)]
pub enum GateError {
    #[error("{unit} is busy and consumer {consumer_id} was rejected; retry later")]
    Rejected {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
    },
    #[error("gave up on {unit} after waiting {waited:?}; consumer {consumer_id} cancelled")]
    TimedOut {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
        waited: Duration,
    },
    #[error("consumer {consumer_id} on {unit} was already released")]
    Released {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
    },
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
}
