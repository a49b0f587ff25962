// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations recorded in the WAL

use rc_core::{ConstraintUnit, Consumer, ConsumerId, ConsumerState};
use serde::{Deserialize, Serialize};

/// A single state change, replayed in sequence order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    ConsumerInsert(ConsumerInsertOp),
    ConsumerTransition(ConsumerTransitionOp),
    /// Marks the first entry written after a compaction
    SnapshotTaken { snapshot_id: String },
}

impl Operation {
    /// Unit touched by the operation, if any
    pub fn unit(&self) -> Option<&ConstraintUnit> {
        match self {
            Operation::ConsumerInsert(op) => Some(&op.consumer.unit),
            Operation::ConsumerTransition(op) => Some(&op.unit),
            Operation::SnapshotTaken { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerInsertOp {
    pub consumer: Consumer,
}

/// Conditional state change; replay re-checks `from`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerTransitionOp {
    pub unit: ConstraintUnit,
    pub consumer_id: ConsumerId,
    pub from: ConsumerState,
    pub to: ConsumerState,
}
