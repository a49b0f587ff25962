// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors surfaced by consumer stores

use crate::state::ApplyError;
use crate::wal::{SnapshotError, WalReadError};
use rc_core::{ConstraintUnit, ConsumerId, ConsumerState, TransitionError};
use thiserror::Error;

/// Errors from [`ConsumerStore`](crate::ConsumerStore) operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("WAL read error: {0}")]
    WalRead(#[from] WalReadError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),
    #[error("consumer {consumer_id} already registered on {unit}")]
    DuplicateConsumer {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
    },
    #[error("order {order} already taken on {unit}")]
    OrderTaken { unit: ConstraintUnit, order: u64 },
    #[error("revision conflict on {unit}: expected {expected}, found {actual}")]
    Conflict {
        unit: ConstraintUnit,
        expected: u64,
        actual: u64,
    },
    #[error("consumer {consumer_id} not found on {unit}")]
    NotFound {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
    },
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("consumers cannot be registered as {0}")]
    InvalidInitialState(ConsumerState),
    #[error("consumer {consumer_id} requests no permits")]
    ZeroPermits { consumer_id: ConsumerId },
}

impl StoreError {
    /// Whether the write lost a race and may succeed on a fresh read
    pub fn is_contention(&self) -> bool {
        matches!(self, StoreError::OrderTaken { .. } | StoreError::Conflict { .. })
    }
}
