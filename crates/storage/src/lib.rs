// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rc-storage: the consumer store
//!
//! The store is the single source of truth for admission state. Every
//! component re-reads it on each call; nothing authoritative is cached,
//! so a restarted worker picks up exactly where the store left off.
//!
//! - [`MemoryStore`] - shared in-process store for tests and embedding
//! - [`WalStore`] - durable, multi-process store backed by a write-ahead log

mod error;
mod memory;
mod state;
mod store;
pub mod wal;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use state::{ApplyError, MaterializedState, UnitRecord};
pub use store::{ConsumerStore, UnitView};
pub use wal::{CompactionResult, WalStore, WalStoreConfig};
