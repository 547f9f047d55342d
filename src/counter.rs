//! The [`Marku`] facade.
//!
//! `Marku` owns the configuration, the notification bus and the statistics,
//! and wires a page and a transport into both batchers. Its three operations
//! never fail: outcomes are reported through element state, notifications
//! and the returned [`BatchOutcome`]s.

use crate::batch::{BatchContext, BatchOutcome, ReadBatcher, WriteBatcher};
use crate::config::{Config, ConfigHolder, InitOptions};
use crate::error::ConfigError;
use crate::events::{CounterEvent, EventBus, ListenerId};
use crate::page::PageContext;
use crate::stats::{EngineStats, StatsSnapshot};
use crate::transport::{Transport, DEFAULT_TIMEOUT};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Outcomes of the two batches run by [`Marku::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// Outcome of the read batch.
    pub read: BatchOutcome,
    /// Outcome of the write batch.
    pub write: BatchOutcome,
}

impl InitReport {
    /// `true` if neither batch failed.
    pub fn is_success(&self) -> bool {
        self.read.is_success() && self.write.is_success()
    }
}

/// Page counter client.
///
/// # Example
///
/// ```rust
/// use marku::config::InitOptions;
/// use marku::page::memory::{MemoryElement, MemoryPage};
/// use marku::page::WRITE_MARKER;
/// use marku::Marku;
/// # use marku::transport::{BatchReadRequest, BatchResponse, BatchWriteRequest, Transport};
/// # use marku::config::Config;
/// # use marku::error::Result;
/// # struct Accept;
/// # #[async_trait::async_trait]
/// # impl Transport for Accept {
/// #     async fn batch_read(&self, _: &Config, _: &BatchReadRequest) -> Result<BatchResponse> {
/// #         Ok(BatchResponse::success(vec![]))
/// #     }
/// #     async fn batch_write(&self, _: &Config, _: &BatchWriteRequest) -> Result<BatchResponse> {
/// #         Ok(BatchResponse::success(vec![]))
/// #     }
/// # }
/// use std::sync::Arc;
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let page = Arc::new(MemoryPage::new());
/// let visit = page.append(MemoryElement::new().with_attr(WRITE_MARKER, "visits"));
///
/// let marku = Marku::new(page.clone(), Arc::new(Accept));
/// let report = marku.init(InitOptions::positional("site1", "https://count.example")).await;
///
/// assert!(report.is_success());
/// assert_eq!(visit.classes(), vec!["marku-submitted".to_string()]);
/// # });
/// ```
pub struct Marku {
    page: Arc<dyn PageContext>,
    transport: Arc<dyn Transport>,
    config: ConfigHolder,
    events: EventBus,
    stats: EngineStats,
    timeout: Duration,
}

impl fmt::Debug for Marku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Marku")
            .field("config", &self.config.current())
            .field("events", &self.events)
            .field("stats", &self.stats.snapshot())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Marku {
    /// Creates a client with an empty configuration.
    pub fn new(page: Arc<dyn PageContext>, transport: Arc<dyn Transport>) -> Self {
        Self {
            page,
            transport,
            config: ConfigHolder::new(),
            events: EventBus::new(),
            stats: EngineStats::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Creates a client posting over HTTP with the default timeout.
    #[cfg(feature = "http")]
    pub fn with_http(page: Arc<dyn PageContext>) -> crate::error::Result<Self> {
        let transport = crate::transport::http::HttpTransport::new()?;
        Ok(Self::new(page, Arc::new(transport)))
    }

    /// Creates a client posting over HTTP, bounding both the HTTP client and
    /// each batch call by `timeout`.
    #[cfg(feature = "http")]
    pub fn with_http_timeout(
        page: Arc<dyn PageContext>,
        timeout: Duration,
    ) -> crate::error::Result<Self> {
        let transport = crate::transport::http::HttpTransport::with_timeout(timeout)?;
        Ok(Self::new(page, Arc::new(transport)).with_timeout(timeout))
    }

    /// Starts from `config` instead of the empty configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = ConfigHolder::with_config(config);
        self
    }

    /// Overrides the bound on each transport call.
    ///
    /// A transport with its own bound, such as the client built by
    /// [`with_http`](Self::with_http), still expires at that bound; the
    /// effective limit is the smaller of the two. Use
    /// [`with_http_timeout`](Self::with_http_timeout) to set both.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configures the client, then loads the displayed counts and submits
    /// the pending increments concurrently.
    pub async fn init(&self, options: impl Into<InitOptions>) -> InitReport {
        self.configure(options);
        let errors = self.validate_config();
        if !errors.is_empty() {
            let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
            tracing::warn!(?errors, "incomplete configuration, batches will fail");
        }
        let (read, write) = tokio::join!(self.load_counters(), self.process_set_counters());
        InitReport { read, write }
    }

    /// Re-initializes the configuration without running any batch.
    pub fn configure(&self, options: impl Into<InitOptions>) {
        self.config.init(options);
    }

    /// Fetches and displays the counts of every read element.
    pub async fn load_counters(&self) -> BatchOutcome {
        let config = self.config.current();
        ReadBatcher::new(self.context())
            .load_counts(self.page.as_ref(), &config)
            .await
    }

    /// Submits the increments of every write element not yet submitted.
    pub async fn process_set_counters(&self) -> BatchOutcome {
        let config = self.config.current();
        WriteBatcher::new(self.context())
            .submit_increments(self.page.as_ref(), &config)
            .await
    }

    /// Returns a copy of the current configuration.
    pub fn config(&self) -> Config {
        self.config.current()
    }

    /// Lists the missing required configuration fields.
    pub fn validate_config(&self) -> Vec<ConfigError> {
        self.config.validate()
    }

    /// Registers a notification listener.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CounterEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Returns the notification bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Returns a snapshot of the engine statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn context(&self) -> BatchContext<'_> {
        BatchContext::new(self.transport.as_ref(), &self.events, &self.stats)
            .with_timeout(self.timeout)
    }
}
