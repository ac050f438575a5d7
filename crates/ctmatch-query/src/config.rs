//! Lookup configuration.

use std::time::Duration;

use ctmatch_codes::CodeMappingPaths;
use ctmatch_core::MatchError;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::registry::DEFAULT_REGISTRY_URL;

/// Settings for one trial lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Trial-search endpoint URL. Required.
    #[serde(alias = "api_endpoint")]
    pub endpoint: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    pub cache: CacheSettings,
    pub registry: RegistrySettings,
    pub code_mappings: CodeMappingPaths,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: default_request_timeout_secs(),
            cache: CacheSettings::default(),
            registry: RegistrySettings::default(),
            code_mappings: CodeMappingPaths::default(),
        }
    }
}

impl LookupConfig {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The configured endpoint, checked to be an absolute http(s) URL.
    pub fn validated_endpoint(&self) -> Result<Url, MatchError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(MatchError::missing_endpoint)?;
        let url = Url::parse(endpoint).map_err(|e| {
            MatchError::configuration(format!("Invalid API_ENDPOINT '{endpoint}': {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MatchError::configuration(format!(
                "Invalid API_ENDPOINT '{endpoint}': scheme must be http or https"
            )));
        }
        Ok(url)
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    /// Period of the expired-entry sweep; 0 disables the background task.
    #[serde(default = "default_cache_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
            cleanup_interval_secs: default_cache_cleanup_interval_secs(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs))
    }
}

fn default_enabled() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_cache_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_cache_cleanup_interval_secs() -> u64 {
    60
}

/// Registry enrichment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_registry_url")]
    pub base_url: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_url: default_registry_url(),
        }
    }
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}
