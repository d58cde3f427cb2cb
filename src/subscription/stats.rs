use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Delivery counters shared by every subscription of one manager
#[derive(Clone, Default)]
pub struct SubscriptionStats {
    delivered: Arc<AtomicU64>,
    malformed: Arc<AtomicU64>,
    handler_failures: Arc<AtomicU64>,
    unsubscribe_failures: Arc<AtomicU64>,
    not_ready: Arc<AtomicU64>,
    open: Arc<AtomicU64>,
}

impl SubscriptionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unsubscribe_failure(&self) {
        self.unsubscribe_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_not_ready(&self) {
        self.not_ready.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn opened(&self) {
        self.open.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn closed(&self) {
        // Never drops below zero
        let _ = self
            .open
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            unsubscribe_failures: self.unsubscribe_failures.load(Ordering::Relaxed),
            not_ready: self.not_ready.load(Ordering::Relaxed),
            open_subscriptions: self.open.load(Ordering::Relaxed),
        }
    }
}

/// Counters at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub malformed: u64,
    pub handler_failures: u64,
    pub unsubscribe_failures: u64,
    pub not_ready: u64,
    pub open_subscriptions: u64,
}
