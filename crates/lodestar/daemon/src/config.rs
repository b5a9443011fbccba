//! Daemon configuration.

use crate::error::{DaemonError, DaemonResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Daemon configuration, loadable from TOML with sane defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Listen address for both beacon and operator surfaces.
    pub bind_addr: String,

    /// Sleep interval handed to beacons with no pending work, in seconds.
    pub idle_interval_secs: u64,

    /// Idle time after which an active beacon is marked stale, in seconds.
    pub stale_threshold_secs: u64,

    /// How often the reaper sweeps the registry, in seconds.
    pub reap_interval_secs: u64,

    /// PostgreSQL connection string. Absent means volatile in-memory
    /// storage, which only makes sense for development.
    pub database_url: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            idle_interval_secs: 10,
            stale_threshold_secs: 600,
            reap_interval_secs: 60,
            database_url: None,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file, or fall back to defaults when no
    /// path is given or the file does not exist.
    pub fn load(path: Option<&str>) -> DaemonResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !Path::new(path).exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| DaemonError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_tunables() {
        let config = DaemonConfig::default();
        assert_eq!(config.idle_interval_secs, 10);
        assert_eq!(config.stale_threshold_secs, 600);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = DaemonConfig::load(Some("/nonexistent/lodestar.toml")).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config: DaemonConfig = toml::from_str("stale_threshold_secs = 120").unwrap();
        assert_eq!(config.stale_threshold_secs, 120);
        assert_eq!(config.reap_interval_secs, 60);
    }
}
