// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wall-clock source for consumer timestamps
//!
//! `created_at` is persisted and compared against retention cutoffs by other
//! processes, so time is `DateTime<Utc>` rather than a monotonic `Instant`.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock: Clone + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Frozen clock that only moves when told to; clones share one instant
#[derive(Clone, Debug)]
pub struct FakeClock {
    frozen: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeClock {
    /// Frozen at the moment of creation, truncated to whole seconds
    pub fn new() -> Self {
        let now = Utc::now();
        Self::at(DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now))
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            frozen: Arc::new(Mutex::new(instant)),
        }
    }

    /// Move forward, e.g. past a retention window. Saturates at the max date.
    pub fn advance(&self, by: std::time::Duration) {
        let by = Duration::from_std(by).unwrap_or(Duration::MAX);
        let mut frozen = self.frozen.lock().unwrap_or_else(|e| e.into_inner());
        *frozen = frozen.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.frozen.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
