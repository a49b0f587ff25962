// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL-based consumer store with crash recovery
//!
//! Any number of processes may open the same directory. Every call takes
//! the `wal.lock` file lock (shared for reads, exclusive for writes), folds
//! in whatever other processes appended since this handle last looked, and
//! only then reads or checks. A conditional write is therefore judged
//! against the latest durable state, never a stale in-memory copy.

use super::operation::Operation;
use super::reader::WalReader;
use super::snapshot::StorableState;
use super::writer::WalWriter;
use crate::error::StoreError;
use crate::state::MaterializedState;
use crate::store::{ConsumerStore, UnitView};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use rc_core::{ConstraintUnit, Consumer, ConsumerId, ConsumerState};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const WAL_FILE: &str = "wal.jsonl";
const SNAPSHOT_FILE: &str = "snapshot.json";
const GENERATION_FILE: &str = "generation";
const LOCK_FILE: &str = "wal.lock";

/// Configuration for WalStore
#[derive(Debug, Clone)]
pub struct WalStoreConfig {
    /// Machine ID stamped on every WAL entry
    pub machine_id: String,
}

impl Default for WalStoreConfig {
    fn default() -> Self {
        Self {
            machine_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl WalStoreConfig {
    pub fn with_machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = machine_id.into();
        self
    }
}

/// Result of a compaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionResult {
    /// WAL entries folded into the snapshot
    pub entries_removed: u64,
    /// Terminal consumers dropped by the retention window
    pub consumers_pruned: usize,
    /// Bytes reclaimed from the log
    pub bytes_reclaimed: u64,
}

/// Durable, multi-process consumer store
pub struct WalStore {
    config: WalStoreConfig,
    base_dir: PathBuf,
    wal_path: PathBuf,
    snapshot_path: PathBuf,
    generation_path: PathBuf,
    lock_file: File,
    inner: Mutex<Inner>,
}

/// This handle's view of the log
struct Inner {
    state: MaterializedState,
    writer: WalWriter,
    /// Generation the state was loaded under
    generation: u64,
    /// Byte offset just past the last entry folded into `state`
    read_position: u64,
    /// Last sequence any process wrote, as far as this handle knows
    last_sequence: Option<u64>,
}

/// Releases the directory lock on drop
struct DirLock<'a> {
    file: &'a File,
}

impl<'a> DirLock<'a> {
    fn shared(file: &'a File) -> Result<Self, StoreError> {
        file.lock_shared()?;
        Ok(Self { file })
    }

    fn exclusive(file: &'a File) -> Result<Self, StoreError> {
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for DirLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file) {
            tracing::warn!(error = %e, "failed to release WAL lock");
        }
    }
}

impl WalStore {
    /// Open or create a WalStore at the given directory
    pub fn open(base_dir: &Path, config: WalStoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(base_dir)?;

        let wal_path = base_dir.join(WAL_FILE);
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(base_dir.join(LOCK_FILE))?;
        let writer = WalWriter::open(&wal_path, &config.machine_id)?;

        let store = Self {
            config,
            base_dir: base_dir.to_path_buf(),
            wal_path,
            snapshot_path: base_dir.join(SNAPSHOT_FILE),
            generation_path: base_dir.join(GENERATION_FILE),
            lock_file,
            inner: Mutex::new(Inner {
                state: MaterializedState::new(),
                writer,
                generation: 0,
                read_position: 0,
                last_sequence: None,
            }),
        };

        {
            let mut inner = store.lock_inner();
            let _lock = DirLock::shared(&store.lock_file)?;
            store.reload(&mut inner, false)?;
        }

        Ok(store)
    }

    /// Open with default configuration
    pub fn open_default(base_dir: &Path) -> Result<Self, StoreError> {
        Self::open(base_dir, WalStoreConfig::default())
    }

    /// Create a WalStore in a fresh temporary directory (for testing)
    pub fn open_temp() -> Result<Self, StoreError> {
        let dir = std::env::temp_dir().join(format!("rc-walstore-{}", uuid::Uuid::new_v4()));
        Self::open_default(&dir)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn machine_id(&self) -> &str {
        &self.config.machine_id
    }

    /// Last sequence written to the log by any process
    pub fn last_sequence(&self) -> Result<Option<u64>, StoreError> {
        self.read(|inner| Ok(inner.last_sequence))
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_generation(&self) -> Result<u64, StoreError> {
        match std::fs::read_to_string(&self.generation_path) {
            Ok(text) => text.trim().parse().map_err(|_| {
                StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("bad generation file: {:?}", text.trim()),
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_generation(&self, generation: u64) -> Result<(), StoreError> {
        let tmp = self.generation_path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(generation.to_string().as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.generation_path)?;
        Ok(())
    }

    /// Rebuild state from the snapshot and the whole log
    fn reload(&self, inner: &mut Inner, repair: bool) -> Result<(), StoreError> {
        let generation = self.read_generation()?;
        let snapshot = StorableState::load(&self.snapshot_path)?;

        match snapshot {
            Some(snapshot) => {
                inner.state = snapshot.to_materialized();
                inner.last_sequence = snapshot.sequence_at_snapshot;
            }
            None => {
                inner.state = MaterializedState::new();
                inner.last_sequence = None;
            }
        }
        inner.generation = generation;
        inner.read_position = 0;

        self.replay(inner, repair)
    }

    /// Fold in entries appended since `read_position`.
    ///
    /// With `repair` set (only under the exclusive lock) a corrupt tail is
    /// cut off so the next append is reachable on replay.
    fn replay(&self, inner: &mut Inner, repair: bool) -> Result<(), StoreError> {
        let reader = WalReader::open_or_empty(&self.wal_path);
        let mut iter = reader.entries_from_position(inner.read_position)?;
        let mut corruption = None;

        for result in iter.by_ref() {
            match result {
                Ok(entry) => {
                    // Entries at or below the snapshot are already folded in
                    if inner.last_sequence.is_some_and(|last| entry.sequence <= last) {
                        continue;
                    }
                    if let Err(e) = inner.state.apply(&entry.operation) {
                        tracing::warn!(
                            sequence = entry.sequence,
                            error = %e,
                            "skipping WAL entry that does not apply"
                        );
                    }
                    inner.last_sequence = Some(entry.sequence);
                }
                Err(e) => {
                    corruption = Some(e);
                    break;
                }
            }
        }
        inner.read_position = iter.last_valid_position();

        if let Some(e) = corruption {
            if repair {
                tracing::warn!(
                    error = %e,
                    position = inner.read_position,
                    "truncating corrupt WAL tail"
                );
                truncate_wal_file(&self.wal_path, inner.read_position)?;
            } else {
                tracing::warn!(
                    error = %e,
                    position = inner.read_position,
                    "stopping WAL replay at corrupt entry"
                );
            }
        }
        Ok(())
    }

    /// Bring `inner` up to date with the directory
    fn catch_up(&self, inner: &mut Inner, repair: bool) -> Result<(), StoreError> {
        let generation = self.read_generation()?;
        let len = std::fs::metadata(&self.wal_path).map_or(0, |m| m.len());
        if generation != inner.generation || len < inner.read_position {
            tracing::debug!(
                generation,
                previous = inner.generation,
                "WAL rewritten by another process; reloading"
            );
            return self.reload(inner, repair);
        }
        self.replay(inner, repair)
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut inner = self.lock_inner();
        let _lock = DirLock::shared(&self.lock_file)?;
        self.catch_up(&mut *inner, false)?;
        f(&*inner)
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut Inner) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut inner = self.lock_inner();
        let _lock = DirLock::exclusive(&self.lock_file)?;
        self.catch_up(&mut *inner, true)?;
        f(&mut *inner)
    }

    /// Append an operation and fold it into the in-memory state
    fn append(inner: &mut Inner, op: Operation) -> Result<u64, StoreError> {
        let sequence = inner.last_sequence.map_or(0, |s| s + 1);
        let written = inner.writer.append(sequence, op.clone(), Utc::now())?;
        inner.read_position += written;
        inner.last_sequence = Some(sequence);
        inner.state.apply(&op)?;
        Ok(sequence)
    }

    /// Fold the log into a new snapshot, dropping terminal consumers created
    /// before `prune_before`, and empty the log.
    ///
    /// Order of writes: snapshot, generation, truncation. A crash between
    /// any two leaves a directory that replays to the same state.
    pub fn compact(
        &self,
        prune_before: Option<DateTime<Utc>>,
    ) -> Result<CompactionResult, StoreError> {
        self.write(|inner| {
            let entries_removed = WalReader::open_or_empty(&self.wal_path).count()?;
            let old_size = std::fs::metadata(&self.wal_path).map_or(0, |m| m.len());

            let consumers_pruned = match prune_before {
                Some(cutoff) => inner.state.prune_terminal(cutoff),
                None => 0,
            };

            let generation = inner.generation + 1;
            let snapshot = StorableState::from_materialized(
                &inner.state,
                inner.last_sequence,
                generation,
                Utc::now(),
            );
            snapshot.write_atomic(&self.snapshot_path)?;
            self.write_generation(generation)?;
            truncate_wal_file(&self.wal_path, 0)?;

            inner.generation = generation;
            inner.read_position = 0;

            let snapshot_id = format!(
                "{:08}-{}",
                generation,
                snapshot.timestamp.format("%Y%m%d%H%M%S")
            );
            Self::append(inner, Operation::SnapshotTaken { snapshot_id })?;

            let new_size = std::fs::metadata(&self.wal_path).map_or(0, |m| m.len());
            let result = CompactionResult {
                entries_removed,
                consumers_pruned,
                bytes_reclaimed: old_size.saturating_sub(new_size),
            };
            tracing::info!(
                entries_removed = result.entries_removed,
                consumers_pruned = result.consumers_pruned,
                bytes_reclaimed = result.bytes_reclaimed,
                generation,
                "WAL compacted"
            );
            Ok(result)
        })
    }

    /// Truncate a WAL at its first corruption point.
    ///
    /// Returns the number of bytes removed, or 0 if the log is intact.
    pub fn repair_wal(base_dir: &Path) -> Result<u64, StoreError> {
        let wal_path = base_dir.join(WAL_FILE);
        if !wal_path.exists() {
            return Ok(0);
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(base_dir.join(LOCK_FILE))?;
        let _lock = DirLock::exclusive(&lock_file)?;

        let reader = WalReader::open_or_empty(&wal_path);
        let mut iter = reader.entries()?;
        let mut had_corruption = false;
        for result in iter.by_ref() {
            if let Err(e) = result {
                tracing::warn!(error = %e, "WAL corruption detected during repair");
                had_corruption = true;
                break;
            }
        }
        if !had_corruption {
            return Ok(0);
        }

        let valid = iter.last_valid_position();
        let old_size = std::fs::metadata(&wal_path)?.len();
        truncate_wal_file(&wal_path, valid)?;
        Ok(old_size.saturating_sub(valid))
    }
}

fn truncate_wal_file(wal_path: &Path, position: u64) -> Result<(), StoreError> {
    let file = OpenOptions::new().write(true).open(wal_path)?;
    file.set_len(position)?;
    file.sync_all()?;
    tracing::info!(position, "WAL truncated");
    Ok(())
}

impl ConsumerStore for WalStore {
    fn insert(
        &self,
        consumer: &Consumer,
        expected_revision: Option<u64>,
    ) -> Result<(), StoreError> {
        self.write(|inner| {
            let op = inner.state.prepare_insert(consumer, expected_revision)?;
            Self::append(inner, op)?;
            Ok(())
        })
    }

    fn update_state(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        from: ConsumerState,
        to: ConsumerState,
        expected_revision: Option<u64>,
    ) -> Result<bool, StoreError> {
        self.write(|inner| {
            match inner
                .state
                .prepare_transition(unit, consumer_id, from, to, expected_revision)?
            {
                Some(op) => {
                    Self::append(inner, op)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn snapshot(&self, unit: &ConstraintUnit) -> Result<UnitView, StoreError> {
        self.read(|inner| Ok(inner.state.view(unit)))
    }

    fn get(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
    ) -> Result<Option<Consumer>, StoreError> {
        self.read(|inner| Ok(inner.state.consumer(unit, consumer_id).cloned()))
    }

    fn consumers(&self, unit: &ConstraintUnit) -> Result<Vec<Consumer>, StoreError> {
        self.read(|inner| Ok(inner.state.all_consumers(unit)))
    }

    fn units(&self) -> Result<Vec<ConstraintUnit>, StoreError> {
        self.read(|inner| Ok(inner.state.unit_names()))
    }

    fn prune_terminal(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.compact(Some(cutoff))?.consumers_pruned)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
