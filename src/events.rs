//! Counter notifications.
//!
//! Batchers report every per-element outcome as a [`CounterEvent`] on an
//! [`EventBus`]. Delivery is synchronous and fire-and-forget: listeners are
//! called in subscription order and nothing is acknowledged. One event is
//! emitted per element, so a key bound to three elements produces three
//! `Loaded` events.
//!
//! # Example
//!
//! ```rust
//! use marku::events::{CounterEvent, EventBus};
//! use std::sync::{Arc, Mutex};
//!
//! let bus = EventBus::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! bus.subscribe(move |event: &CounterEvent| sink.lock().unwrap().push(event.name()));
//!
//! bus.emit(&CounterEvent::Error { key: "views".into() });
//! assert_eq!(*seen.lock().unwrap(), vec!["marku:counter-error"]);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

/// Outcome of one element in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterEvent {
    /// A read element now displays `count`.
    Loaded {
        /// Counter key.
        key: String,
        /// Displayed count.
        count: i64,
    },
    /// A read element's count could not be retrieved.
    Error {
        /// Counter key.
        key: String,
    },
    /// A write element's increment was accepted.
    Submitted {
        /// Counter key.
        key: String,
        /// Increment that was sent.
        increment: i64,
    },
    /// A write element's increment was not accepted.
    SubmitError {
        /// Counter key.
        key: String,
    },
}

impl CounterEvent {
    /// Event name as dispatched on a DOM element.
    pub const fn name(&self) -> &'static str {
        match self {
            CounterEvent::Loaded { .. } => "marku:counter-loaded",
            CounterEvent::Error { .. } => "marku:counter-error",
            CounterEvent::Submitted { .. } => "marku:counter-submitted",
            CounterEvent::SubmitError { .. } => "marku:counter-submit-error",
        }
    }

    /// Counter key the event refers to.
    pub fn key(&self) -> &str {
        match self {
            CounterEvent::Loaded { key, .. }
            | CounterEvent::Error { key }
            | CounterEvent::Submitted { key, .. }
            | CounterEvent::SubmitError { key } => key,
        }
    }

    /// Returns `true` for `Error` and `SubmitError`.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CounterEvent::Error { .. } | CounterEvent::SubmitError { .. }
        )
    }
}

impl fmt::Display for CounterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterEvent::Loaded { key, count } => write!(f, "{} {}={}", self.name(), key, count),
            CounterEvent::Submitted { key, increment } => {
                write!(f, "{} {}+{}", self.name(), key, increment)
            }
            CounterEvent::Error { key } | CounterEvent::SubmitError { key } => {
                write!(f, "{} {}", self.name(), key)
            }
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone)]
enum Listener {
    Callback(Arc<dyn Fn(&CounterEvent) + Send + Sync>),
    Channel(mpsc::UnboundedSender<CounterEvent>),
}

/// A list of independent listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    /// Creates a bus without listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener called for every subsequent event.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CounterEvent) + Send + Sync + 'static,
    {
        self.register(Listener::Callback(Arc::new(listener)))
    }

    /// Registers a listener forwarding events into an unbounded channel.
    ///
    /// The listener is removed by the first emission after the receiver is
    /// dropped.
    pub fn subscribe_channel(&self) -> (ListenerId, mpsc::UnboundedReceiver<CounterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.register(Listener::Channel(tx)), rx)
    }

    fn register(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, listener));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Delivers an event to every listener.
    pub fn emit(&self, event: &CounterEvent) {
        tracing::trace!(event = %event, "emit");
        // Snapshot so listeners may subscribe or unsubscribe while handling.
        let listeners: Vec<(ListenerId, Listener)> = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let mut closed = Vec::new();
        for (id, listener) in listeners {
            match listener {
                Listener::Callback(callback) => callback(event),
                Listener::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        closed.push(id);
                    }
                }
            }
        }
        if !closed.is_empty() {
            tracing::debug!(count = closed.len(), "removing closed channel listeners");
            self.listeners
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .retain(|(id, _)| !closed.contains(id));
        }
    }
}
