// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-Ahead Log (WAL) storage
//!
//! The log is the source of truth for a [`WalStore`]; its in-memory state is
//! derived by replaying entries on top of the latest snapshot.
//!
//! ## Layout
//!
//! ```text
//! <dir>/wal.jsonl      checksummed entries, one per line
//! <dir>/snapshot.json  state folded in by the last compaction
//! <dir>/generation     bumped whenever the log is rewritten
//! <dir>/wal.lock       fs2 lock shared by every process using <dir>
//! ```
//!
//! ## Durability Guarantees
//!
//! - Every append is followed by `fsync()` before the lock is released
//! - Checksums detect corruption from bit flips
//! - Truncated writes (crash during append) stop replay at the last valid entry
//! - Writers cut a corrupt tail off under the exclusive lock before appending

pub mod entry;
pub mod operation;
pub mod reader;
pub mod snapshot;
pub mod store;
pub mod writer;

pub use entry::WalEntry;
pub use operation::{ConsumerInsertOp, ConsumerTransitionOp, Operation};
pub use reader::{WalEntryIter, WalReadError, WalReader};
pub use snapshot::{SnapshotError, StorableState, StorableUnit};
pub use store::{CompactionResult, WalStore, WalStoreConfig};
pub use writer::WalWriter;
