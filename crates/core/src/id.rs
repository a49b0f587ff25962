// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer IDs for callers without one of their own
//!
//! Workflow engines pass their step execution ID. One-off registrations
//! (the CLI without `--id`) get a random one; tests use readable sequences.

use crate::unit::ConsumerId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub trait IdGen {
    fn next(&self) -> ConsumerId;
}

/// Random v4 UUIDs, unique across processes sharing a store
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next(&self) -> ConsumerId {
        ConsumerId::new(uuid::Uuid::new_v4().to_string())
    }
}

/// `<prefix>-1`, `<prefix>-2`, ... shared by all clones
#[derive(Clone, Debug)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl IdGen for SequentialIdGen {
    fn next(&self) -> ConsumerId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        ConsumerId::new(format!("{}-{}", self.prefix, n))
    }
}
