// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery of constraint events to interested parties

use async_trait::async_trait;
use rc_core::ConstraintEvent;
use tracing::Instrument;

/// Receives every event the admission engine emits.
///
/// Delivery is best effort: the store is authoritative and parked callers
/// fall back to polling it, so a notifier never reports failure.
#[async_trait]
pub trait PromotionNotifier: Clone + Send + Sync + 'static {
    async fn notify(&self, event: ConstraintEvent);
}

/// Discards every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl PromotionNotifier for NoOpNotifier {
    async fn notify(&self, _event: ConstraintEvent) {}
}

/// Wrapper that adds tracing to any notifier
#[derive(Clone, Debug)]
pub struct TracedNotifier<N> {
    inner: N,
}

impl<N> TracedNotifier<N> {
    pub fn new(inner: N) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }
}

#[async_trait]
impl<N: PromotionNotifier> PromotionNotifier for TracedNotifier<N> {
    async fn notify(&self, event: ConstraintEvent) {
        let span = tracing::info_span!(
            "constraint.notify",
            event = %event.name(),
            unit = %event.unit(),
            consumer_id = %event.consumer_id(),
        );

        async {
            let start = std::time::Instant::now();
            self.inner.notify(event).await;
            tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "delivered");
        }
        .instrument(span)
        .await
    }
}
