// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL reader for iterating and validating entries
//!
//! Invalid entries (checksum mismatch or parse errors) mark the truncation
//! point; iteration reports them once and the caller decides what to do.

use super::entry::WalEntry;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when reading WAL entries
#[derive(Debug, Error)]
pub enum WalReadError {
    #[error("corrupted entry at byte {offset}: {reason}")]
    Corrupted { offset: u64, reason: String },
    #[error("checksum mismatch at byte {offset}")]
    ChecksumMismatch { offset: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// WAL reader for iterating over entries
pub struct WalReader {
    path: PathBuf,
}

impl WalReader {
    /// A missing file reads as an empty log
    pub fn open_or_empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Iterate over all valid entries
    pub fn entries(&self) -> Result<WalEntryIter, WalReadError> {
        self.entries_from_position(0)
    }

    /// Iterate starting at a byte offset previously reported by
    /// [`WalEntryIter::last_valid_position`]
    pub fn entries_from_position(&self, offset: u64) -> Result<WalEntryIter, WalReadError> {
        WalEntryIter::new(&self.path, offset)
    }

    /// Count the valid entries before any corruption
    pub fn count(&self) -> Result<u64, WalReadError> {
        let mut count = 0;
        for entry in self.entries()? {
            if entry.is_err() {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Iterator over WAL entries with position tracking
pub struct WalEntryIter {
    reader: Option<BufReader<File>>,
    /// Byte offset just past the last valid entry
    last_valid_position: u64,
    /// Byte offset of the next line to read
    position: u64,
}

impl WalEntryIter {
    fn new(path: &Path, offset: u64) -> Result<Self, WalReadError> {
        let reader = if path.exists() {
            let mut file = File::open(path)?;
            file.seek(SeekFrom::Start(offset))?;
            Some(BufReader::new(file))
        } else {
            None
        };

        Ok(Self {
            reader,
            last_valid_position: offset,
            position: offset,
        })
    }

    /// Byte offset just past the last entry returned
    pub fn last_valid_position(&self) -> u64 {
        self.last_valid_position
    }
}

impl Iterator for WalEntryIter {
    type Item = Result<WalEntry, WalReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;

        loop {
            let offset = self.position;
            let mut line = String::new();
            let bytes_read = match reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(n) => n as u64,
                Err(e) => {
                    self.reader = None;
                    return Some(Err(WalReadError::Io(e)));
                }
            };
            self.position += bytes_read;

            // A line without its newline is a torn append
            if !line.ends_with('\n') {
                self.reader = None;
                return Some(Err(WalReadError::Corrupted {
                    offset,
                    reason: "truncated entry".to_string(),
                }));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                self.last_valid_position = self.position;
                continue;
            }

            let entry = match WalEntry::decode(trimmed) {
                Ok(entry) => entry,
                Err(e) => {
                    self.reader = None;
                    return Some(Err(WalReadError::Corrupted {
                        offset,
                        reason: e.to_string(),
                    }));
                }
            };

            if !entry.verify() {
                self.reader = None;
                return Some(Err(WalReadError::ChecksumMismatch { offset }));
            }

            self.last_valid_position = self.position;
            return Some(Ok(entry));
        }
    }
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
