//! Server configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::stats::Limits;

/// Server configuration options
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum concurrent clients (0 = unlimited)
    pub max_connections: u32,

    /// Maximum aggregate bandwidth in kilobytes per second (0 = unlimited)
    pub max_bandwidth: u64,

    /// Serve public UI resources on the public listeners
    pub enable_public_ui: bool,

    /// Global switch for live programs
    pub enable_programs: bool,

    /// Directory holding one subdirectory per on-demand asset
    pub vod_root: PathBuf,

    /// Plain-HTTP base URL used in playlists and protocol redirects
    pub base_url: String,

    /// Period of the lifecycle timer
    #[serde(with = "seconds")]
    pub tick_interval: Duration,

    /// Lifetime of one-time redirect paths
    #[serde(with = "seconds")]
    pub onetime_lifetime: Duration,

    /// Recent messages kept in the operational log
    pub log_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 0, // Unlimited
            max_bandwidth: 0,
            enable_public_ui: true,
            enable_programs: true,
            vod_root: PathBuf::from("vod"),
            base_url: "http://localhost:8008".to_string(),
            tick_interval: Duration::from_secs(1),
            onetime_lifetime: Duration::from_secs(5),
            log_capacity: 50,
        }
    }
}

impl ServerConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Admission ceilings derived from this config
    pub fn limits(&self) -> Limits {
        Limits {
            max_connections: self.max_connections,
            max_bitrate: self.max_bandwidth.saturating_mul(8000),
        }
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set maximum bandwidth in kB/s
    pub fn max_bandwidth(mut self, kbytes: u64) -> Self {
        self.max_bandwidth = kbytes;
        self
    }

    pub fn enable_public_ui(mut self, enable: bool) -> Self {
        self.enable_public_ui = enable;
        self
    }

    pub fn enable_programs(mut self, enable: bool) -> Self {
        self.enable_programs = enable;
        self
    }

    pub fn vod_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.vod_root = root.into();
        self
    }

    /// Set the base URL; a trailing slash is dropped
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn onetime_lifetime(mut self, lifetime: Duration) -> Self {
        self.onetime_lifetime = lifetime;
        self
    }

    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }
}

/// Durations as (possibly fractional) seconds
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.max_connections, 0);
        assert_eq!(config.max_bandwidth, 0);
        assert!(config.enable_public_ui);
        assert!(config.enable_programs);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.onetime_lifetime, Duration::from_secs(5));
        assert_eq!(config.log_capacity, 50);
    }

    #[test]
    fn test_limits_unlimited_by_default() {
        assert_eq!(ServerConfig::default().limits(), Limits::default());
    }

    #[test]
    fn test_bandwidth_in_kilobytes() {
        let limits = ServerConfig::default().max_bandwidth(125).limits();

        assert_eq!(limits.max_bitrate, 1_000_000);
    }

    #[test]
    fn test_builder_max_connections() {
        let config = ServerConfig::default().max_connections(100);

        assert_eq!(config.max_connections, 100);
        assert_eq!(config.limits().max_connections, 100);
    }

    #[test]
    fn test_builder_base_url_trims_slash() {
        let config = ServerConfig::default().base_url("http://media.example:8008/");

        assert_eq!(config.base_url, "http://media.example:8008");
    }

    #[test]
    fn test_builder_chaining() {
        let config = ServerConfig::default()
            .max_connections(50)
            .max_bandwidth(10_000)
            .enable_public_ui(false)
            .enable_programs(false)
            .vod_root("/srv/vod")
            .tick_interval(Duration::from_millis(500))
            .onetime_lifetime(Duration::from_secs(2))
            .log_capacity(10);

        assert_eq!(config.max_connections, 50);
        assert_eq!(config.max_bandwidth, 10_000);
        assert!(!config.enable_public_ui);
        assert!(!config.enable_programs);
        assert_eq!(config.vod_root, PathBuf::from("/srv/vod"));
        assert_eq!(config.tick_interval, Duration::from_millis(500));
        assert_eq!(config.onetime_lifetime, Duration::from_secs(2));
        assert_eq!(config.log_capacity, 10);
    }

    #[test]
    fn test_from_toml() {
        let config = ServerConfig::from_toml_str(
            r#"
            max_connections = 200
            max_bandwidth = 50000
            enable_public_ui = false
            vod_root = "/srv/vod"
            tick_interval = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.max_connections, 200);
        assert_eq!(config.limits().max_bitrate, 400_000_000);
        assert!(!config.enable_public_ui);
        assert!(config.enable_programs);
        assert_eq!(config.vod_root, PathBuf::from("/srv/vod"));
        assert_eq!(config.tick_interval, Duration::from_millis(500));
        assert_eq!(config.onetime_lifetime, Duration::from_secs(5));
    }

    #[test]
    fn test_from_toml_rejects_bad_types() {
        let err = ServerConfig::from_toml_str("max_connections = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(ServerConfig::from_toml_str("tick_interval = -1.0").is_err());
    }
}
