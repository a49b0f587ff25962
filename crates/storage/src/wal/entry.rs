// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL entry structure with checksum verification
//!
//! Each entry carries a sequence number, the wall time it was recorded, the
//! id of the machine that wrote it, the operation, and a CRC32 of the
//! operation's JSON.

use super::operation::Operation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single line of the write-ahead log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Strictly increasing across compactions
    pub sequence: u64,
    /// Microseconds since Unix epoch
    pub timestamp_micros: i64,
    /// Writer identity, useful when several workers share a directory
    pub machine_id: String,
    pub operation: Operation,
    /// CRC32 of the serialized operation
    pub checksum: u32,
}

impl WalEntry {
    pub fn new(
        sequence: u64,
        machine_id: &str,
        operation: Operation,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sequence,
            timestamp_micros: recorded_at.timestamp_micros(),
            machine_id: machine_id.to_string(),
            checksum: checksum_of(&operation),
            operation,
        }
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.timestamp_micros)
    }

    /// Whether the stored checksum still matches the operation
    pub fn verify(&self) -> bool {
        self.checksum == checksum_of(&self.operation)
    }

    /// Serialize to one newline-terminated JSON line
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Parse a single line (without its newline)
    pub fn decode(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

fn checksum_of(operation: &Operation) -> u32 {
    // Operations hold only strings, integers and maps with string keys, so
    // serialization cannot fail; an empty payload would fail verification.
    let json = serde_json::to_vec(operation).unwrap_or_default();
    crc32fast::hash(&json)
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
