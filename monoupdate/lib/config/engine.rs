//! Engine-wide configuration.

use std::time::Duration;

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::utils::env::get_self_image;

use super::{
    DEFAULT_HISTORY_CAPACITY, DEFAULT_METADATA_TIMEOUT, DEFAULT_PULL_TIMEOUT,
    DEFAULT_REGISTRY_RETRIES, DEFAULT_RELEASE_RETRIES, DEFAULT_SCAN_CONCURRENCY,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Tunables for the update engine.
///
/// Every field has a default, so `EngineConfig::default()` is a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct EngineConfig {
    /// Maximum number of registry checks in flight at once during a scan.
    #[serde(default = "default_scan_concurrency")]
    #[builder(default = DEFAULT_SCAN_CONCURRENCY)]
    scan_concurrency: usize,

    /// Hard timeout for token, manifest, blob and release calls.
    #[serde(default = "default_metadata_timeout")]
    #[builder(default = DEFAULT_METADATA_TIMEOUT)]
    metadata_timeout: Duration,

    /// Hard timeout for pulling an image.
    #[serde(default = "default_pull_timeout")]
    #[builder(default = DEFAULT_PULL_TIMEOUT)]
    pull_timeout: Duration,

    /// Number of update records retained in history.
    #[serde(default = "default_history_capacity")]
    #[builder(default = DEFAULT_HISTORY_CAPACITY)]
    history_capacity: usize,

    /// Retries for transient registry failures.
    #[serde(default = "default_registry_retries")]
    #[builder(default = DEFAULT_REGISTRY_RETRIES)]
    registry_retries: u32,

    /// Retries for transient release lookup failures.
    #[serde(default = "default_release_retries")]
    #[builder(default = DEFAULT_RELEASE_RETRIES)]
    release_retries: u32,

    /// The image the engine itself runs from. Never updated by a schedule.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default = get_self_image(), setter(strip_option))]
    self_image: Option<String>,

    /// The OCI architecture name used to pick a platform from a manifest list.
    #[serde(default = "default_host_arch")]
    #[builder(default = default_host_arch(), setter(into))]
    host_arch: String,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Serde Defaults
//--------------------------------------------------------------------------------------------------

fn default_scan_concurrency() -> usize {
    DEFAULT_SCAN_CONCURRENCY
}

fn default_metadata_timeout() -> Duration {
    DEFAULT_METADATA_TIMEOUT
}

fn default_pull_timeout() -> Duration {
    DEFAULT_PULL_TIMEOUT
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_registry_retries() -> u32 {
    DEFAULT_REGISTRY_RETRIES
}

fn default_release_retries() -> u32 {
    DEFAULT_RELEASE_RETRIES
}

fn default_host_arch() -> String {
    crate::oci::host_arch().to_string()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::builder().self_image("monoupdate".to_string()).build();
        assert_eq!(*config.get_scan_concurrency(), DEFAULT_SCAN_CONCURRENCY);
        assert_eq!(*config.get_history_capacity(), 100);
        assert_eq!(*config.get_registry_retries(), 0);
        assert_eq!(config.get_self_image().as_deref(), Some("monoupdate"));
        assert_eq!(config.get_host_arch(), crate::oci::host_arch());
    }

    #[test]
    fn test_engine_config_deserializes_partial_json() -> anyhow::Result<()> {
        let config: EngineConfig = serde_json::from_str(r#"{"scan_concurrency": 3}"#)?;
        assert_eq!(*config.get_scan_concurrency(), 3);
        assert_eq!(*config.get_pull_timeout(), DEFAULT_PULL_TIMEOUT);
        assert_eq!(config.get_host_arch(), crate::oci::host_arch());
        Ok(())
    }
}
