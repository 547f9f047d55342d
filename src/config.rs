//! Site identity and endpoint configuration.
//!
//! A [`Config`] is a plain value: batchers receive an owned snapshot and never
//! observe later changes. The [`ConfigHolder`] keeps the current value and
//! supports the two initialization forms:
//!
//! - **Positional** ([`InitOptions::Positional`]): replaces every field. Fields
//!   not given fall back to their defaults.
//! - **Partial** ([`InitOptions::Partial`]): merges the supplied
//!   [`ConfigOptions`] over the current value. Omitted fields keep their
//!   previous value.
//!
//! # Examples
//!
//! ```rust
//! use marku::config::{ConfigHolder, ConfigOptions, InitOptions};
//!
//! let holder = ConfigHolder::new();
//! holder.init(InitOptions::positional("site1", "https://old.example"));
//!
//! holder.init(ConfigOptions::new().api_base_url("https://new.example"));
//! let config = holder.current();
//! assert_eq!(config.site_id, "site1");
//! assert_eq!(config.api_base_url, "https://new.example");
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Configuration shared by both batchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Site identifier issued by the backend.
    pub site_id: String,
    /// Base URL of the counter API, e.g. `https://count.example.com`.
    pub api_base_url: String,
    /// Whether the page path sent to the backend keeps its query string.
    pub include_query: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: String::new(),
            api_base_url: String::new(),
            include_query: true,
        }
    }
}

impl Config {
    /// Creates a configuration with the given site and API base URL.
    pub fn new(site_id: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            api_base_url: api_base_url.into(),
            include_query: true,
        }
    }

    /// Sets whether the page path keeps its query string.
    pub fn with_include_query(mut self, include_query: bool) -> Self {
        self.include_query = include_query;
        self
    }

    /// Lists every missing required field. An empty list means the
    /// configuration is usable for network calls.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.site_id.is_empty() {
            errors.push(ConfigError::MissingSiteId);
        }
        if self.api_base_url.is_empty() {
            errors.push(ConfigError::MissingApiBaseUrl);
        }
        errors
    }

    /// Returns `true` if no required field is missing.
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Returns the first missing required field, if any.
    pub(crate) fn ensure_valid(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A partial configuration, merged field by field over the current value.
///
/// Deserializes from the same camelCase shape as [`Config`] with every field
/// optional, so options can come straight from a JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOptions {
    /// New site identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    /// New API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// New query-string policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_query: Option<bool>,
}

impl ConfigOptions {
    /// Creates an empty set of options. Merging it changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the site identifier.
    pub fn site_id(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    /// Sets the API base URL.
    pub fn api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = Some(api_base_url.into());
        self
    }

    /// Sets the query-string policy.
    pub fn include_query(mut self, include_query: bool) -> Self {
        self.include_query = Some(include_query);
        self
    }

    /// Applies the supplied fields over `config`.
    pub fn merge_into(&self, config: &mut Config) {
        if let Some(site_id) = &self.site_id {
            config.site_id.clone_from(site_id);
        }
        if let Some(api_base_url) = &self.api_base_url {
            config.api_base_url.clone_from(api_base_url);
        }
        if let Some(include_query) = self.include_query {
            config.include_query = include_query;
        }
    }
}

/// Argument of [`ConfigHolder::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOptions {
    /// Replaces the whole configuration.
    Positional {
        /// Site identifier.
        site_id: String,
        /// API base URL; empty when omitted.
        api_base_url: Option<String>,
        /// Query-string policy; `true` when omitted.
        include_query: Option<bool>,
    },
    /// Merges over the current configuration.
    Partial(ConfigOptions),
}

impl InitOptions {
    /// Positional form with a site identifier and an API base URL.
    pub fn positional(site_id: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        InitOptions::Positional {
            site_id: site_id.into(),
            api_base_url: Some(api_base_url.into()),
            include_query: None,
        }
    }

    /// Sets the query-string policy of a positional form. Has no effect on
    /// the partial form, which carries its own `include_query` option.
    pub fn with_include_query(self, include_query: bool) -> Self {
        match self {
            InitOptions::Positional {
                site_id,
                api_base_url,
                ..
            } => InitOptions::Positional {
                site_id,
                api_base_url,
                include_query: Some(include_query),
            },
            partial => partial,
        }
    }

    fn apply(self, config: &mut Config) {
        match self {
            InitOptions::Positional {
                site_id,
                api_base_url,
                include_query,
            } => {
                *config = Config {
                    site_id,
                    api_base_url: api_base_url.unwrap_or_default(),
                    include_query: include_query.unwrap_or(true),
                };
            }
            InitOptions::Partial(options) => options.merge_into(config),
        }
    }
}

impl From<&str> for InitOptions {
    fn from(site_id: &str) -> Self {
        InitOptions::Positional {
            site_id: site_id.to_string(),
            api_base_url: None,
            include_query: None,
        }
    }
}

impl From<String> for InitOptions {
    fn from(site_id: String) -> Self {
        InitOptions::Positional {
            site_id,
            api_base_url: None,
            include_query: None,
        }
    }
}

impl From<ConfigOptions> for InitOptions {
    fn from(options: ConfigOptions) -> Self {
        InitOptions::Partial(options)
    }
}

impl From<Config> for InitOptions {
    fn from(config: Config) -> Self {
        InitOptions::Positional {
            site_id: config.site_id,
            api_base_url: Some(config.api_base_url),
            include_query: Some(config.include_query),
        }
    }
}

/// Holds the current [`Config`] and hands out snapshots.
#[derive(Debug, Default)]
pub struct ConfigHolder {
    config: RwLock<Config>,
}

impl ConfigHolder {
    /// Creates a holder with the empty default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a holder starting from `config`.
    pub fn with_config(config: Config) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Re-initializes the configuration, either replacing or merging
    /// depending on the form of `options`.
    pub fn init(&self, options: impl Into<InitOptions>) {
        let options = options.into();
        // A poisoned lock still holds a fully written Config.
        let mut config = self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        options.apply(&mut config);
        tracing::debug!(
            site_id = %config.site_id,
            api_base_url = %config.api_base_url,
            include_query = config.include_query,
            "configuration updated"
        );
    }

    /// Returns a copy of the current configuration.
    pub fn current(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Lists the missing required fields of the current configuration.
    pub fn validate(&self) -> Vec<ConfigError> {
        self.current().validate()
    }
}
