//! Configuration for reel-sync.
//!
//! # Example
//!
//! ```
//! use reel_sync::ReelSyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = ReelSyncConfig::default();
//! assert_eq!(config.background_refresh_secs, 300);
//! assert!(config.edge_url.is_none());
//!
//! // Full config
//! let config = ReelSyncConfig {
//!     remote_url: "https://db.example.test".into(),
//!     edge_url: Some("https://edge.example.test".into()),
//!     local_db_path: Some("reel.db".into()),
//!     background_refresh_secs: 60,
//!     ..Default::default()
//! };
//! assert!(config.background_period().is_some());
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the sync core.
///
/// Only `remote_url` matters for a working setup; everything else has a
/// default. The background period can change at runtime through the
/// `watch` channel handed to [`crate::AggregationLayer::start_background`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReelSyncConfig {
    /// Base URL of the authoritative row API
    #[serde(default)]
    pub remote_url: String,

    /// API key sent to the remote store
    #[serde(default)]
    pub remote_api_key: Option<String>,

    /// Edge cache base URL (absent = edge disabled, reads go straight to remote)
    #[serde(default)]
    pub edge_url: Option<String>,

    /// SQLite file for the local store (absent = in-memory)
    #[serde(default)]
    pub local_db_path: Option<String>,

    /// Background refresh period in seconds (0 = disabled)
    #[serde(default = "default_background_refresh_secs")]
    pub background_refresh_secs: u64,

    /// Response header the edge marks cache hits with
    #[serde(default = "default_cache_hit_header")]
    pub cache_hit_header: String,

    /// Display name of the synthetic collection
    #[serde(default = "default_synthetic_collection_name")]
    pub synthetic_collection_name: String,

    /// Resources probed by edge diagnostics
    #[serde(default = "default_diagnostics_resources")]
    pub diagnostics_resources: Vec<String>,
}

fn default_background_refresh_secs() -> u64 { 300 }
fn default_cache_hit_header() -> String { "x-cache".to_string() }
fn default_synthetic_collection_name() -> String { "Watchlist".to_string() }
fn default_diagnostics_resources() -> Vec<String> {
    ["movies", "lists", "statistics", "profile"].map(String::from).to_vec()
}

impl ReelSyncConfig {
    /// Parse from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// `None` when background refresh is disabled.
    #[must_use]
    pub fn background_period(&self) -> Option<Duration> {
        (self.background_refresh_secs > 0).then(|| Duration::from_secs(self.background_refresh_secs))
    }
}

impl Default for ReelSyncConfig {
    fn default() -> Self {
        Self {
            remote_url: String::new(),
            remote_api_key: None,
            edge_url: None,
            local_db_path: None,
            background_refresh_secs: default_background_refresh_secs(),
            cache_hit_header: default_cache_hit_header(),
            synthetic_collection_name: default_synthetic_collection_name(),
            diagnostics_resources: default_diagnostics_resources(),
        }
    }
}
