// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshots written by compaction
//!
//! A snapshot captures every unit record as of a WAL sequence number so the
//! log before it can be discarded. It is written to a temporary file and
//! renamed into place, so readers see either the old or the new snapshot.

use crate::state::{MaterializedState, UnitRecord};
use chrono::{DateTime, Utc};
use rc_core::{ConstraintUnit, Consumer};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid snapshot format: {0}")]
    InvalidFormat(String),
}

/// Serializable image of the whole store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorableState {
    pub version: u32,
    /// Last WAL sequence folded into this snapshot
    pub sequence_at_snapshot: Option<u64>,
    pub generation: u64,
    pub timestamp: DateTime<Utc>,
    pub units: Vec<StorableUnit>,
}

/// One unit's record, consumers in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorableUnit {
    pub unit: ConstraintUnit,
    pub max_order: u64,
    pub revision: u64,
    pub consumers: Vec<Consumer>,
}

impl StorableState {
    /// Current version of the snapshot format
    pub const CURRENT_VERSION: u32 = 1;

    pub fn from_materialized(
        state: &MaterializedState,
        sequence: Option<u64>,
        generation: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut units: Vec<_> = state
            .units()
            .map(|(unit, record)| StorableUnit {
                unit: unit.clone(),
                max_order: record.max_order,
                revision: record.revision,
                consumers: record.ordered().cloned().collect(),
            })
            .collect();
        units.sort_by(|a, b| a.unit.cmp(&b.unit));

        Self {
            version: Self::CURRENT_VERSION,
            sequence_at_snapshot: sequence,
            generation,
            timestamp,
            units,
        }
    }

    pub fn to_materialized(&self) -> MaterializedState {
        MaterializedState::from_units(self.units.iter().map(|su| {
            let record = UnitRecord {
                consumers: su
                    .consumers
                    .iter()
                    .map(|c| (c.consumer_id.clone(), c.clone()))
                    .collect(),
                by_order: Default::default(),
                max_order: su.max_order,
                revision: su.revision,
            };
            (su.unit.clone(), record)
        }))
    }

    /// Load the snapshot at `path`, if one was ever written
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: StorableState = serde_json::from_reader(BufReader::new(file))?;

        if state.version != Self::CURRENT_VERSION {
            return Err(SnapshotError::InvalidFormat(format!(
                "unsupported version: {} (expected {})",
                state.version,
                Self::CURRENT_VERSION
            )));
        }

        Ok(Some(state))
    }

    /// Write to `path` via a synced temporary file and rename
    pub fn write_atomic(&self, path: &Path) -> Result<(), SnapshotError> {
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
