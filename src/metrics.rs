//! Engine counters.
//!
//! Relaxed atomic counters shared between the engine and the pipeline via an
//! `Arc` handle. Eventually consistent, not real-time; the pipeline logs a
//! snapshot when it stops.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineMetrics {
    samples_received: AtomicU64,
    points_emitted: AtomicU64,
    ignored: AtomicU64,
    unexpected: AtomicU64,
    malformed: AtomicU64,
    dropped: AtomicU64,
    acked: AtomicU64,
}

impl EngineMetrics {
    pub const fn new() -> Self {
        EngineMetrics {
            samples_received: AtomicU64::new(0),
            points_emitted: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            unexpected: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            acked: AtomicU64::new(0),
        }
    }

    /// Record a message body handed to the engine.
    #[inline]
    pub fn record_received(&self) {
        self.samples_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record points emitted for one sample.
    #[inline]
    pub fn record_points(&self, count: u64) {
        self.points_emitted.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a sample consumed by a deliberate ignore rule.
    #[inline]
    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a sample that matched no rule at all.
    #[inline]
    pub fn record_unexpected(&self) {
        self.unexpected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a body that did not decode.
    #[inline]
    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a sample refused by its codec.
    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message acknowledged to the transport.
    #[inline]
    pub fn record_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            points_emitted: self.points_emitted.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            unexpected: self.unexpected.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
        }
    }
}

/// Copyable snapshot of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub samples_received: u64,
    pub points_emitted: u64,
    pub ignored: u64,
    pub unexpected: u64,
    pub malformed: u64,
    pub dropped: u64,
    pub acked: u64,
}
