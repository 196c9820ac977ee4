//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{normalize_base_url, normalize_text_option};

const DEFAULT_RETRY_BUDGET: u32 = 3;
const DEFAULT_STALE_SYNCING_SECS: u64 = 120;
const DEFAULT_MAPPING_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_MAX_DIMENSION: u32 = 1600;
const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Retry and recovery policy for queue draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SyncOptions {
    /// Attempts after which an entry is stuck until explicitly reset
    pub retry_budget: u32,
    /// Seconds an entry may stay `syncing` before a new pass treats it as interrupted
    pub stale_syncing_secs: u64,
    /// Seconds a local-to-remote id mapping is kept once nothing local refers to it
    pub mapping_retention_secs: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            stale_syncing_secs: DEFAULT_STALE_SYNCING_SECS,
            mapping_retention_secs: DEFAULT_MAPPING_RETENTION_SECS,
        }
    }
}

impl SyncOptions {
    pub const fn stale_syncing_after(&self) -> Duration {
        Duration::from_secs(self.stale_syncing_secs)
    }

    pub const fn mapping_retention(&self) -> Duration {
        Duration::from_secs(self.mapping_retention_secs)
    }
}

/// Photo pipeline parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CompressionOptions {
    /// Longest allowed edge in pixels
    pub max_dimension: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl CompressionOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_dimension == 0 {
            return Err(Error::Config(
                "compression.max_dimension must be greater than zero".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(
                "compression.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration for a device running the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    /// Base URL of the remote system of record
    pub api_base_url: Option<String>,
    pub sync: SyncOptions,
    pub compression: CompressionOptions,
}

impl EngineConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        config.validated()
    }

    /// Normalize the API base URL and check every section.
    pub fn validated(mut self) -> Result<Self> {
        self.api_base_url = normalize_api_base_url(self.api_base_url)?;
        if self.sync.retry_budget == 0 {
            return Err(Error::Config(
                "sync.retry_budget must be greater than zero".to_string(),
            ));
        }
        self.compression.validate()?;
        Ok(self)
    }
}

fn normalize_api_base_url(raw: Option<String>) -> Result<Option<String>> {
    let Some(url) = normalize_text_option(raw) else {
        return Ok(None);
    };
    normalize_base_url(&url).map(Some).ok_or_else(|| {
        Error::Config("api_base_url must include http:// or https://".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.sync.retry_budget, 3);
        assert_eq!(config.sync.stale_syncing_after(), Duration::from_secs(120));
        assert_eq!(
            config.sync.mapping_retention(),
            Duration::from_secs(7 * 24 * 60 * 60)
        );
    }

    #[test]
    fn api_base_url_is_normalized() {
        let config =
            EngineConfig::from_json(r#"{ "api_base_url": " https://api.example.com/ " }"#)
                .unwrap();
        assert_eq!(
            config.api_base_url.as_deref(),
            Some("https://api.example.com")
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = EngineConfig::from_json(r#"{ "sync": { "retries": 5 } }"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(EngineConfig::from_json(r#"{ "api_base_url": "api.example.com" }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "sync": { "retry_budget": 0 } }"#).is_err());
        assert!(
            EngineConfig::from_json(r#"{ "compression": { "jpeg_quality": 0 } }"#).is_err()
        );
        assert!(
            EngineConfig::from_json(r#"{ "compression": { "max_dimension": 0 } }"#).is_err()
        );
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EngineConfig::from_json(r#"{ "sync": { "retry_budget": 5 } }"#).unwrap();
        assert_eq!(config.sync.retry_budget, 5);
        assert_eq!(config.sync.stale_syncing_secs, 120);
        assert_eq!(config.compression, CompressionOptions::default());
    }
}
