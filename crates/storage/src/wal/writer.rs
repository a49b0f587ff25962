// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL writer for durable append operations
//!
//! Sequence numbers are assigned by the caller, which holds the store lock
//! and knows the last sequence any process wrote.

use super::entry::WalEntry;
use super::operation::Operation;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only handle on a WAL file
pub struct WalWriter {
    path: PathBuf,
    file: File,
    machine_id: String,
}

impl WalWriter {
    /// Open or create a WAL file in append mode
    pub fn open(path: &Path, machine_id: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Append mode keeps writes at the end even after another process
        // truncates the file underneath this handle
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            machine_id: machine_id.to_string(),
        })
    }

    /// Append an operation and fsync before returning.
    ///
    /// Returns the number of bytes written.
    pub fn append(
        &mut self,
        sequence: u64,
        operation: Operation,
        recorded_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let entry = WalEntry::new(sequence, &self.machine_id, operation, recorded_at);
        let line = entry.encode()?;

        // A failed append must not leave a replayable entry behind
        let start = self.file.metadata()?.len();
        if let Err(e) = self.file.write_all(&line).and_then(|()| self.file.sync_all()) {
            return Err(roll_back(&self.file, start, e));
        }

        Ok(line.len() as u64)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }
}

/// Cut the file back to `start` after a failed append, returning the cause
fn roll_back(file: &File, start: u64, cause: std::io::Error) -> StoreError {
    match file.set_len(start).and_then(|()| file.sync_all()) {
        Ok(()) => tracing::warn!(error = %cause, position = start, "WAL append rolled back"),
        Err(e) => tracing::error!(
            error = %cause,
            rollback_error = %e,
            position = start,
            "WAL append failed and could not be rolled back"
        ),
    }
    StoreError::Io(cause)
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
