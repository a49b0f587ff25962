// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus for constraint events
//!
//! Subscribers register a pattern over event names (`constraint:promoted`,
//! `constraint:*`, `**`) and receive matching events on an unbounded
//! channel. A dropped receiver is pruned on the next publish.

use async_trait::async_trait;
use rc_core::ConstraintEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::notify::PromotionNotifier;

/// Sender for event delivery
pub type EventSender = mpsc::UnboundedSender<ConstraintEvent>;
/// Receiver for event delivery
pub type EventReceiver = mpsc::UnboundedReceiver<ConstraintEvent>;

/// Pattern over colon-separated event names.
///
/// `*` matches one segment, `**` matches everything remaining.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventPattern(String);

impl EventPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn matches(&self, event_name: &str) -> bool {
        if self.0.is_empty() {
            return false;
        }
        let pattern: Vec<&str> = self.0.split(':').collect();
        let name: Vec<&str> = event_name.split(':').collect();
        match_segments(&pattern, &name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn match_segments(pattern: &[&str], name: &[&str]) -> bool {
    match (pattern.split_first(), name.split_first()) {
        (None, None) => true,
        (Some((&"**", _)), _) => true,
        (Some((&"*", p_rest)), Some((_, n_rest))) => match_segments(p_rest, n_rest),
        (Some((p, p_rest)), Some((n, n_rest))) if p == n => match_segments(p_rest, n_rest),
        _ => false,
    }
}

/// Handle for unsubscribing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Routes events to matching subscribers
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<SubscriberId, (EventPattern, EventSender)>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events matching `pattern`
    pub fn subscribe(&self, pattern: &str) -> (SubscriberId, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));

        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, (EventPattern::new(pattern), tx));

        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    /// Publish an event to every matching subscriber
    pub fn publish(&self, event: &ConstraintEvent) {
        let name = event.name();
        let mut closed = Vec::new();
        {
            let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            for (id, (pattern, tx)) in subs.iter() {
                if pattern.matches(&name) && tx.send(event.clone()).is_err() {
                    closed.push(*id);
                }
            }
        }
        if !closed.is_empty() {
            let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
            for id in closed {
                subs.remove(&id);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl PromotionNotifier for EventBus {
    async fn notify(&self, event: ConstraintEvent) {
        self.publish(&event);
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
