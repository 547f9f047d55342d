//! Batch read and batch write engines.
//!
//! Both batchers follow the same shape:
//!
//! ```text
//!   scan ──► group by key ──► one transport call ──► fan-out to elements
//!                                  (timeout)            + notifications
//! ```
//!
//! Every element-state change happens before or after the single suspension
//! point. Failures of any kind are absorbed here and turned into element
//! state, notifications and a [`BatchOutcome`]; nothing is propagated.
//!
//! Elements waiting on the call are held by an `InFlight` guard. If the
//! invocation is dropped before the call returns, the guard moves them to
//! the failure state of their role so that none is left `loading` or
//! `processing`.

pub mod read;
pub mod write;

pub use read::ReadBatcher;
pub use write::WriteBatcher;

use crate::config::Config;
use crate::error::{Result, TransportError};
use crate::events::EventBus;
use crate::page::{Element, ElementRef};
use crate::stats::EngineStats;
use crate::transport::{BatchResponse, Transport, DEFAULT_TIMEOUT};
use std::future::Future;
use std::time::Duration;

/// Summary of one batcher invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// No eligible element was found; no call was made.
    NothingToDo,
    /// The batch was accepted and every element reached its success state.
    Succeeded {
        /// Distinct keys (read) or entries (write) in the batch.
        keys: usize,
        /// Elements updated.
        elements: usize,
    },
    /// The batch failed and every element reached its failure state.
    Failed {
        /// Distinct keys (read) or entries (write) in the batch.
        keys: usize,
        /// Elements updated.
        elements: usize,
        /// Why the batch failed.
        reason: String,
    },
}

impl BatchOutcome {
    /// `true` unless the batch failed. An empty batch counts as success.
    pub fn is_success(&self) -> bool {
        !matches!(self, BatchOutcome::Failed { .. })
    }

    /// Number of elements whose state changed.
    pub fn elements(&self) -> usize {
        match self {
            BatchOutcome::NothingToDo => 0,
            BatchOutcome::Succeeded { elements, .. } | BatchOutcome::Failed { elements, .. } => {
                *elements
            }
        }
    }
}

/// Collaborators shared by both batchers.
#[derive(Clone, Copy)]
pub struct BatchContext<'a> {
    /// Network seam.
    pub transport: &'a dyn Transport,
    /// Notification sink.
    pub events: &'a EventBus,
    /// Statistics sink.
    pub stats: &'a EngineStats,
    /// Upper bound on the transport call.
    pub timeout: Duration,
}

impl<'a> BatchContext<'a> {
    /// Creates a context using [`DEFAULT_TIMEOUT`].
    pub fn new(transport: &'a dyn Transport, events: &'a EventBus, stats: &'a EngineStats) -> Self {
        Self {
            transport,
            events,
            stats,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs a transport call after checking `config`, bounded by the
    /// timeout. An incomplete configuration never reaches the transport.
    pub(crate) async fn call<F>(&self, config: &Config, call: F) -> Result<BatchResponse>
    where
        F: Future<Output = Result<BatchResponse>>,
    {
        config.ensure_valid()?;
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }
}

/// Elements bound to a call that has not returned yet.
///
/// Dropping the guard without [`settle`](InFlight::settle) applies `abandon`
/// to every element it holds.
pub(crate) struct InFlight {
    elements: Vec<ElementRef>,
    abandon: fn(&dyn Element),
}

impl InFlight {
    pub(crate) fn new(elements: Vec<ElementRef>, abandon: fn(&dyn Element)) -> Self {
        Self { elements, abandon }
    }

    /// Releases the elements; the caller reconciles them.
    pub(crate) fn settle(mut self) {
        self.elements.clear();
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.elements.is_empty() {
            return;
        }
        tracing::warn!(
            elements = self.elements.len(),
            "batch dropped before the call returned"
        );
        for element in self.elements.drain(..) {
            (self.abandon)(element.as_ref());
        }
    }
}
