//! Wire types and the transport seam.
//!
//! A [`Transport`] performs one JSON exchange per batch. The batchers build
//! the request, call the transport exactly once and interpret the
//! [`BatchResponse`] envelope themselves, so a transport only has to move
//! bytes and report transport-level failures.
//!
//! # Wire format
//!
//! ```text
//! POST {apiBaseUrl}/api/count/batch
//!   {"siteId":"s1","keys":["views","likes"],"url":"/post/1"}
//! POST {apiBaseUrl}/api/increment/batch
//!   {"siteId":"s1","url":"/post/1","counters":[{"key":"views","increment":1}]}
//!
//! response
//!   {"code":200,"message":"Success","data":[{"key":"views","num":41}]}
//! ```
//!
//! # Feature Flags
//!
//! - `http` (default) - enables [`http::HttpTransport`], backed by `reqwest`

#[cfg(feature = "http")]
pub mod http;

#[cfg(test)]
pub(crate) mod mock;

use crate::config::Config;
use crate::error::{Result, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Endpoint of the batch read call, relative to the API base URL.
pub const READ_PATH: &str = "/api/count/batch";

/// Endpoint of the batch write call, relative to the API base URL.
pub const WRITE_PATH: &str = "/api/increment/batch";

/// Envelope code meaning success.
pub const SUCCESS_CODE: i64 = 200;

/// Upper bound on a single transport call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of the batch read call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReadRequest {
    /// Site identifier.
    pub site_id: String,
    /// Unique keys in first-seen order.
    pub keys: Vec<String>,
    /// Path of the page the counters belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One element's contribution to a write batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterIncrement {
    /// Counter key.
    pub key: String,
    /// Amount to add.
    pub increment: i64,
}

/// Body of the batch write call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteRequest {
    /// Site identifier.
    pub site_id: String,
    /// Path of the page being counted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// One entry per contributing element; keys may repeat.
    pub counters: Vec<CounterIncrement>,
}

/// A counter value returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterEntry {
    /// Counter key.
    pub key: String,
    /// Current count. A null or missing value counts as zero.
    #[serde(default)]
    pub num: Option<i64>,
}

/// Response envelope shared by both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Application-level status; [`SUCCESS_CODE`] means success.
    pub code: i64,
    /// Human-readable status message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Counter values. Omitted by the server when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<CounterEntry>>,
}

impl BatchResponse {
    /// A successful envelope carrying `data`.
    pub fn success(data: Vec<CounterEntry>) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: Some("Success".to_string()),
            data: Some(data),
        }
    }

    /// A failed envelope.
    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Returns `true` if the envelope code is [`SUCCESS_CODE`].
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Fails with [`TransportError::Rejected`] unless the envelope succeeded.
    pub fn ensure_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TransportError::Rejected {
                code: self.code,
                message: self.message,
            })
        }
    }

    /// Turns a successful envelope into a key to count map. Entries with a
    /// null count map to zero; a later entry for the same key wins.
    pub fn into_counts(self) -> Result<HashMap<String, i64>> {
        let response = self.ensure_success()?;
        Ok(response
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|entry| (entry.key, entry.num.unwrap_or(0)))
            .collect())
    }
}

/// Builds the absolute URL of an endpoint. An absolute `path` replaces any
/// path carried by the base URL.
pub fn endpoint(api_base_url: &str, path: &str) -> Result<Url> {
    Ok(Url::parse(api_base_url)?.join(path)?)
}

/// Performs the network exchange of a batch.
///
/// Implementations report transport-level failures (connection, status,
/// decoding) as errors and return the decoded envelope otherwise; the
/// envelope code is checked by the caller. Callers bound every call with a
/// timeout and drop the future when it expires.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches the counts of `request.keys`.
    async fn batch_read(&self, config: &Config, request: &BatchReadRequest)
        -> Result<BatchResponse>;

    /// Submits the increments of `request.counters`.
    async fn batch_write(
        &self,
        config: &Config,
        request: &BatchWriteRequest,
    ) -> Result<BatchResponse>;
}
