//! Configuration for the hybrid store.
//!
//! The configuration covers backend-facing limits: how search indexes are
//! named, how large each batched write may be, how many documents a search
//! call returns, and the IN-list size above which the primary store can no
//! longer serve a comparison.
//!
//! # Example
//!
//! ```
//! use hybrid_persistence::config::HybridConfig;
//!
//! let config = HybridConfig::builder()
//!     .index_prefix("prod.")
//!     .search_batch_size(100)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.index_name("User"), "prod.User");
//! ```
//!
//! Configurations are also deserializable; missing fields take their defaults:
//!
//! ```
//! use hybrid_persistence::config::HybridConfig;
//!
//! let config: HybridConfig = serde_json::from_str(r#"{ "search_result_limit": 50 }"#).unwrap();
//! assert_eq!(config.search_result_limit, 50);
//! assert_eq!(config.search_batch_size, 200);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on documents per search index put call.
pub const MAX_SEARCH_BATCH_SIZE: usize = 200;

/// Hybrid store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Prefix prepended to the kind to form the search index name.
    #[serde(default)]
    pub index_prefix: String,

    /// Maximum documents per search index put call.
    #[serde(default = "default_search_batch_size")]
    pub search_batch_size: usize,

    /// Maximum records per primary store put call.
    #[serde(default = "default_primary_batch_size")]
    pub primary_batch_size: usize,

    /// Maximum documents returned by a single search call.
    #[serde(default = "default_search_result_limit")]
    pub search_result_limit: usize,

    /// IN-lists longer than this are not served by the primary store.
    #[serde(default = "default_max_primary_in_values")]
    pub max_primary_in_values: usize,
}

fn default_search_batch_size() -> usize {
    MAX_SEARCH_BATCH_SIZE
}

fn default_primary_batch_size() -> usize {
    500
}

fn default_search_result_limit() -> usize {
    1000
}

fn default_max_primary_in_values() -> usize {
    30
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            index_prefix: String::new(),
            search_batch_size: default_search_batch_size(),
            primary_batch_size: default_primary_batch_size(),
            search_result_limit: default_search_result_limit(),
            max_primary_in_values: default_max_primary_in_values(),
        }
    }
}

impl HybridConfig {
    /// Creates a builder starting from the defaults.
    pub fn builder() -> HybridConfigBuilder {
        HybridConfigBuilder::new()
    }

    /// Returns the search index name for a kind.
    pub fn index_name(&self, kind: &str) -> String {
        format!("{}{}", self.index_prefix, kind)
    }

    /// Validates the configuration, returning warnings for legal but unusual
    /// settings.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        if self.search_batch_size == 0 || self.search_batch_size > MAX_SEARCH_BATCH_SIZE {
            return Err(ConfigError::InvalidSearchBatchSize(self.search_batch_size));
        }
        if self.primary_batch_size == 0 {
            return Err(ConfigError::ZeroLimit("primary_batch_size"));
        }
        if self.search_result_limit == 0 {
            return Err(ConfigError::ZeroLimit("search_result_limit"));
        }
        if self.max_primary_in_values == 0 {
            return Err(ConfigError::ZeroLimit("max_primary_in_values"));
        }
        if self
            .index_prefix
            .chars()
            .any(|c| c.is_whitespace() || c == '!')
        {
            return Err(ConfigError::InvalidIndexPrefix(self.index_prefix.clone()));
        }

        let mut warnings = Vec::new();
        if self.search_batch_size < 10 {
            warnings.push(ConfigWarning::SmallBatchSize {
                setting: "search_batch_size",
                value: self.search_batch_size,
            });
        }
        if self.primary_batch_size < 10 {
            warnings.push(ConfigWarning::SmallBatchSize {
                setting: "primary_batch_size",
                value: self.primary_batch_size,
            });
        }
        if self.index_prefix.is_empty() {
            warnings.push(ConfigWarning::NoIndexPrefix);
        }
        Ok(warnings)
    }
}

/// Builder for [`HybridConfig`].
#[derive(Debug, Clone, Default)]
pub struct HybridConfigBuilder {
    config: HybridConfig,
}

impl HybridConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the search index name prefix.
    pub fn index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.index_prefix = prefix.into();
        self
    }

    /// Sets the maximum documents per search index put call.
    pub fn search_batch_size(mut self, size: usize) -> Self {
        self.config.search_batch_size = size;
        self
    }

    /// Sets the maximum records per primary store put call.
    pub fn primary_batch_size(mut self, size: usize) -> Self {
        self.config.primary_batch_size = size;
        self
    }

    /// Sets the maximum documents returned by a search call.
    pub fn search_result_limit(mut self, limit: usize) -> Self {
        self.config.search_result_limit = limit;
        self
    }

    /// Sets the IN-list size limit for primary store comparisons.
    pub fn max_primary_in_values(mut self, limit: usize) -> Self {
        self.config.max_primary_in_values = limit;
        self
    }

    /// Builds the configuration, validating it first.
    pub fn build(self) -> Result<HybridConfig, ConfigError> {
        let _ = self.config.validate()?;
        Ok(self.config)
    }

    /// Builds the configuration and returns warnings.
    pub fn build_with_warnings(self) -> Result<(HybridConfig, Vec<ConfigWarning>), ConfigError> {
        let warnings = self.config.validate()?;
        Ok((self.config, warnings))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Search batch size outside `1..=200`.
    #[error("search_batch_size must be between 1 and {MAX_SEARCH_BATCH_SIZE}, got {0}")]
    InvalidSearchBatchSize(usize),

    /// A limit that must be positive is zero.
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    /// The index prefix contains characters index names cannot hold.
    #[error("invalid index prefix: {0:?}")]
    InvalidIndexPrefix(String),
}

/// Configuration warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A batch size small enough to multiply round trips.
    SmallBatchSize {
        /// The setting name.
        setting: &'static str,
        /// The configured value.
        value: usize,
    },

    /// Index names equal the bare kind, which can collide across applications.
    NoIndexPrefix,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HybridConfig::default();
        let warnings = config.validate().unwrap();
        assert_eq!(warnings, vec![ConfigWarning::NoIndexPrefix]);
        assert_eq!(config.max_primary_in_values, 30);
    }

    #[test]
    fn test_builder_rejects_oversized_search_batch() {
        let err = HybridConfig::builder()
            .search_batch_size(201)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidSearchBatchSize(201));
    }

    #[test]
    fn test_builder_rejects_zero_limits() {
        let err = HybridConfig::builder()
            .primary_batch_size(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroLimit("primary_batch_size"));

        let err = HybridConfig::builder()
            .max_primary_in_values(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroLimit("max_primary_in_values"));
    }

    #[test]
    fn test_builder_reports_warnings() {
        let (config, warnings) = HybridConfig::builder()
            .index_prefix("app.")
            .search_batch_size(5)
            .build_with_warnings()
            .unwrap();
        assert_eq!(config.index_name("User"), "app.User");
        assert_eq!(
            warnings,
            vec![ConfigWarning::SmallBatchSize {
                setting: "search_batch_size",
                value: 5
            }]
        );
    }

    #[test]
    fn test_rejects_whitespace_prefix() {
        let err = HybridConfig::builder()
            .index_prefix("my app")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIndexPrefix(_)));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: HybridConfig =
            serde_json::from_str(r#"{ "index_prefix": "t.", "primary_batch_size": 50 }"#).unwrap();
        assert_eq!(config.index_prefix, "t.");
        assert_eq!(config.primary_batch_size, 50);
        assert_eq!(config.search_result_limit, 1000);
    }
}
