//! # Marku - Batched Page View Counters
//!
//! A library that drives view and interaction counters embedded in a page.
//! Elements carry directives naming a counter key; the engine reads every
//! displayed count in **one** request and submits every pending increment in
//! **one** request, then reconciles each element's state with the answer.
//!
//! ## The Problem
//!
//! A page may show the same metric several times (a view count in the header
//! and in the footer) and may increment several metrics at once. Issuing one
//! request per element multiplies round-trips, and re-running the scan on a
//! page that has already been counted must not count it again.
//!
//! ## The Solution: Batching and Reconciliation
//!
//! 1. **Deduplication**: read elements are grouped by key; each distinct key
//!    is requested once and its value fans out to every bound element.
//!
//! 2. **One round-trip per invocation**: a read invocation makes at most one
//!    read call and a write invocation at most one write call, whatever the
//!    number of elements.
//!
//! 3. **Whole-key outcomes**: every element bound to a key ends in the same
//!    state. A failed read marks every requested key `error`; a key missing
//!    from a successful answer is shown as 0.
//!
//! 4. **Idempotent submission**: `submitted` is sticky and `processing`
//!    elements are excluded, so repeated or overlapping invocations never
//!    send the same element twice. `submit-error` elements are retried.
//!
//! ```text
//!   page ──scan──► group by key ──► Transport (1 call, 10 s) ──► fan-out
//!                                                                 │
//!                               element classes + CounterEvent ◄──┘
//! ```
//!
//! ## Directives
//!
//! | Attribute | Role |
//! |-----------|------|
//! | `marku-get-count="key"` | element text shows the count of `key` |
//! | `marku-set-count="key"` | page view increments `key` |
//! | `marku-inc="n"` | increment magnitude (default 1) |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use marku::config::InitOptions;
//! use marku::page::memory::{MemoryElement, MemoryPage};
//! use marku::page::READ_MARKER;
//! use marku::Marku;
//! use std::sync::Arc;
//!
//! let page = Arc::new(MemoryPage::with_location("https://blog.example/post/1")?);
//! let views = page.append(MemoryElement::new().with_attr(READ_MARKER, "views"));
//!
//! let marku = Marku::with_http(page.clone())?;
//! marku.subscribe(|event| println!("{event}"));
//!
//! let report = marku.init(InitOptions::positional("site1", "https://count.example")).await;
//! println!("views: {}", views.text());
//! ```
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | site identity and endpoint, positional or merging init |
//! | [`page`] | element and document traits, directive scanner, state classes |
//! | [`increment`] | increment parser |
//! | [`transport`] | wire types and the [`Transport`](transport::Transport) seam |
//! | [`batch`] | read and write batchers |
//! | [`events`] | counter notifications |
//! | [`stats`] | engine statistics |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `http` (default) | [`transport::http::HttpTransport`] backed by `reqwest` |
//! | `cli` | the `marku` command-line front end |
//!
//! ## Logging
//!
//! The crate logs through `tracing` and never installs a subscriber.

pub mod batch;
pub mod config;
pub mod counter;
pub mod error;
pub mod events;
pub mod increment;
pub mod page;
pub mod stats;
pub mod transport;

pub use batch::BatchOutcome;
pub use counter::{InitReport, Marku};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name, used as the prefix of every directive and class.
pub const LIBRARY_NAME: &str = "Marku";
