//! Engine statistics.
//!
//! [`EngineStats`] counts batches and per-element outcomes across the life of
//! a [`Marku`](crate::Marku) instance. Updates use relaxed atomics; a
//! [`StatsSnapshot`] is a serializable point-in-time copy.
//!
//! # Examples
//!
//! ```rust
//! use marku::stats::EngineStats;
//!
//! let stats = EngineStats::new();
//! stats.record_read_batch();
//! stats.record_loaded(3);
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.read_batches, 1);
//! assert_eq!(snapshot.elements_loaded, 3);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing what the engine has done so far.
#[derive(Debug, Default)]
pub struct EngineStats {
    read_batches: AtomicU64,
    write_batches: AtomicU64,
    transport_failures: AtomicU64,
    elements_loaded: AtomicU64,
    elements_failed: AtomicU64,
    elements_submitted: AtomicU64,
    elements_submit_failed: AtomicU64,
    elements_skipped: AtomicU64,
}

impl EngineStats {
    /// Creates statistics with every counter at zero.
    pub const fn new() -> Self {
        Self {
            read_batches: AtomicU64::new(0),
            write_batches: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            elements_loaded: AtomicU64::new(0),
            elements_failed: AtomicU64::new(0),
            elements_submitted: AtomicU64::new(0),
            elements_submit_failed: AtomicU64::new(0),
            elements_skipped: AtomicU64::new(0),
        }
    }

    /// A read batch reached the transport.
    pub fn record_read_batch(&self) {
        self.read_batches.fetch_add(1, Ordering::Relaxed);
    }

    /// A write batch reached the transport.
    pub fn record_write_batch(&self) {
        self.write_batches.fetch_add(1, Ordering::Relaxed);
    }

    /// A batch failed, locally or remotely.
    pub fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// `n` read elements reached `loaded`.
    pub fn record_loaded(&self, n: usize) {
        self.elements_loaded.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// `n` read elements reached `error`.
    pub fn record_failed(&self, n: usize) {
        self.elements_failed.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// `n` write elements reached `submitted`.
    pub fn record_submitted(&self, n: usize) {
        self.elements_submitted.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// `n` write elements reached `submit-error`.
    pub fn record_submit_failed(&self, n: usize) {
        self.elements_submit_failed
            .fetch_add(n as u64, Ordering::Relaxed);
    }

    /// An element was skipped because its key is empty.
    pub fn record_skipped(&self) {
        self.elements_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            read_batches: self.read_batches.load(Ordering::Relaxed),
            write_batches: self.write_batches.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            elements_loaded: self.elements_loaded.load(Ordering::Relaxed),
            elements_failed: self.elements_failed.load(Ordering::Relaxed),
            elements_submitted: self.elements_submitted.load(Ordering::Relaxed),
            elements_submit_failed: self.elements_submit_failed.load(Ordering::Relaxed),
            elements_skipped: self.elements_skipped.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Read batches sent to the transport.
    pub read_batches: u64,
    /// Write batches sent to the transport.
    pub write_batches: u64,
    /// Batches that failed.
    pub transport_failures: u64,
    /// Read elements that reached `loaded`.
    pub elements_loaded: u64,
    /// Read elements that reached `error`.
    pub elements_failed: u64,
    /// Write elements that reached `submitted`.
    pub elements_submitted: u64,
    /// Write elements that reached `submit-error`.
    pub elements_submit_failed: u64,
    /// Elements skipped for an empty key.
    pub elements_skipped: u64,
}

impl StatsSnapshot {
    /// Serializes the snapshot to JSON, pretty-printed if `pretty` is set.
    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}
