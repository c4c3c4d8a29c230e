//! Process configuration
//!
//! Loaded once at startup and passed to every component through the app
//! context; there is no global. A config error is fatal with an explicit
//! message.
//!
//! ## Loading order
//!
//! 1. Explicit `--config` path from the CLI
//! 2. `BRIDGEWATCH_CONFIG` environment variable
//! 3. `bridgewatch.toml` in the current working directory
//! 4. Built-in defaults

pub mod defaults;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::types::BridgeRegion;

/// Configuration errors; all fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One roster bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub id: String,
    pub name: String,
    pub region: BridgeRegion,
    pub lat: f64,
    pub lng: f64,
}

/// Per-source-IP request caps, per minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub data_per_minute: u32,
    pub static_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { data_per_minute: 60, static_per_minute: 30 }
    }
}

/// Cache-Control TTLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub data_max_age_secs: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { data_max_age_secs: 10 }
    }
}

/// AIS ingest options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AisConfig {
    /// Enable the UDP listener.
    pub udp_enabled: bool,
    pub udp_port: u16,
    /// Sender IP → station id. Unmapped senders get `udp-{ip}`.
    pub udp_station_map: BTreeMap<String, String>,
    /// AISHub API key; the HTTP poller is disabled when unset.
    pub aishub_api_key: Option<String>,
    pub aishub_url: String,
}

impl Default for AisConfig {
    fn default() -> Self {
        Self {
            udp_enabled: true,
            udp_port: 10110,
            udp_station_map: BTreeMap::new(),
            aishub_api_key: None,
            aishub_url: "https://data.aishub.net/ws.php".to_string(),
        }
    }
}

/// Upstream bridge-status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Region code → endpoint URL.
    pub regions: BTreeMap<BridgeRegion, String>,
    /// Host for which TLS verification is disabled. Workaround for one
    /// upstream's broken certificate chain; never a default.
    pub insecure_host: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            regions: defaults::region_endpoints().into_iter().collect(),
            insecure_host: None,
        }
    }
}

/// Top-level process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    /// IANA zone name for all schedule evaluation.
    pub timezone: String,
    pub snapshot_path: PathBuf,
    pub history_dir: PathBuf,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub ais: AisConfig,
    pub upstream: UpstreamConfig,
    pub bridges: Vec<BridgeConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            timezone: "America/Toronto".to_string(),
            snapshot_path: PathBuf::from("data/bridges.json"),
            history_dir: PathBuf::from("data/history"),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            ais: AisConfig::default(),
            upstream: UpstreamConfig::default(),
            bridges: defaults::bridge_roster(),
        }
    }
}

impl Config {
    /// Load configuration following the documented order, then validate.
    pub fn load(explicit_path: Option<&Path>) -> Result<Config, ConfigError> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("BRIDGEWATCH_CONFIG").ok().map(PathBuf::from))
            .or_else(|| {
                let cwd = PathBuf::from("bridgewatch.toml");
                cwd.exists().then_some(cwd)
            });

        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
                toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?
            }
            None => Config::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// The configured zone, parsed.
    pub fn tz(&self) -> Tz {
        Tz::from_str(&self.timezone).unwrap_or(chrono_tz::America::Toronto)
    }

    /// Roster bridges in `region`.
    pub fn bridges_in(&self, region: BridgeRegion) -> impl Iterator<Item = &BridgeConfig> {
        self.bridges.iter().filter(move |b| b.region == region)
    }

    /// Validate cross-field constraints. Called by `load`; exposed for tests
    /// and for configs built in code.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Tz::from_str(&self.timezone).is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown timezone '{}'",
                self.timezone
            )));
        }

        if self.bridges.is_empty() {
            return Err(ConfigError::Invalid("bridge roster is empty".to_string()));
        }

        let mut ids: Vec<&str> = self.bridges.iter().map(|b| b.id.as_str()).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(ConfigError::Invalid("duplicate bridge id in roster".to_string()));
        }

        for bridge in &self.bridges {
            if !self.upstream.regions.contains_key(&bridge.region) {
                return Err(ConfigError::Invalid(format!(
                    "bridge '{}' is in region '{}' which has no upstream endpoint",
                    bridge.id,
                    bridge.region.short_code()
                )));
            }
        }

        if self.rate_limit.data_per_minute == 0 || self.rate_limit.static_per_minute == 0 {
            return Err(ConfigError::Invalid("rate limits must be positive".to_string()));
        }

        if self.ais.udp_enabled && self.ais.udp_port == 0 {
            return Err(ConfigError::Invalid(
                "ais.udp_port must be set when ais.udp_enabled".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn default_tz_is_toronto() {
        assert_eq!(Config::default().tz(), chrono_tz::America::Toronto);
    }

    #[test]
    fn rejects_unknown_timezone() {
        let config = Config { timezone: "Mars/Olympus".to_string(), ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_duplicate_bridge_ids() {
        let mut config = Config::default();
        let dup = config.bridges[0].clone();
        config.bridges.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bridge_without_endpoint() {
        let mut config = Config::default();
        config.upstream.regions.remove(&BridgeRegion::Sct);
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bind_addr = "127.0.0.1:9090"

[ais]
udp_enabled = false
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert!(!config.ais.udp_enabled);
        // Defaults still fill the rest.
        assert_eq!(config.bridges.len(), defaults::bridge_roster().len());
    }

    #[test]
    fn parse_error_is_explicit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_addr = [").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
    }
}
