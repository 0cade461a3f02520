//! Optimizer configuration

use crate::error::{Error, Result};
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default outbound video ceiling in kbps
pub const DEFAULT_MAX_BANDWIDTH_KBPS: u32 = 2500;

/// Default sampling interval of a monitor loop
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1000;

/// ICE server descriptor, passed through to the transport layer untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }
}

/// Per-connection optimization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Preferred codec (informational, not enforced)
    pub preferred_codec: String,
    /// Apply bitrate decisions to video senders
    pub enable_adaptive_bitrate: bool,
    /// Outbound video ceiling (kbps)
    pub max_bandwidth_kbps: u32,
    pub ice_servers: Vec<IceServerConfig>,
    pub ice_candidate_pool_size: u8,
    /// Monitor loop cadence (milliseconds)
    pub sample_interval_ms: u64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            preferred_codec: "vp9".to_string(),
            enable_adaptive_bitrate: true,
            max_bandwidth_kbps: DEFAULT_MAX_BANDWIDTH_KBPS,
            ice_servers: vec![
                IceServerConfig::stun("stun:stun.l.google.com:19302"),
                IceServerConfig::stun("stun:stun1.l.google.com:19302"),
            ],
            ice_candidate_pool_size: 10,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
        }
    }
}

impl OptimizationConfig {
    /// Reject values the monitor loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_bandwidth_kbps == 0 {
            return Err(Error::InvalidConfig(
                "max_bandwidth_kbps must be positive".to_string(),
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "sample_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Apply a partial override on top of this config
    #[must_use]
    pub fn merged(&self, overrides: &ConfigOverride) -> Self {
        Self {
            preferred_codec: overrides
                .preferred_codec
                .clone()
                .unwrap_or_else(|| self.preferred_codec.clone()),
            enable_adaptive_bitrate: overrides
                .enable_adaptive_bitrate
                .unwrap_or(self.enable_adaptive_bitrate),
            max_bandwidth_kbps: overrides
                .max_bandwidth_kbps
                .unwrap_or(self.max_bandwidth_kbps),
            ice_servers: overrides
                .ice_servers
                .clone()
                .unwrap_or_else(|| self.ice_servers.clone()),
            ice_candidate_pool_size: overrides
                .ice_candidate_pool_size
                .unwrap_or(self.ice_candidate_pool_size),
            sample_interval_ms: overrides
                .sample_interval_ms
                .unwrap_or(self.sample_interval_ms),
        }
    }
}

/// Partial per-connection override; unset fields keep the optimizer's value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverride {
    pub preferred_codec: Option<String>,
    pub enable_adaptive_bitrate: Option<bool>,
    pub max_bandwidth_kbps: Option<u32>,
    pub ice_servers: Option<Vec<IceServerConfig>>,
    pub ice_candidate_pool_size: Option<u8>,
    pub sample_interval_ms: Option<u64>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Append to this file instead of stdout
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file_path: None,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcConfig {
    pub optimizer: OptimizationConfig,
    pub logging: LoggingConfig,
}

impl RtcConfig {
    /// Load configuration from an optional file, then `SYNCTV_RTC_*` environment variables
    pub fn load(config_file: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // SYNCTV_RTC_OPTIMIZER__MAX_BANDWIDTH_KBPS=3000
        builder = builder.add_source(
            Environment::with_prefix("SYNCTV_RTC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::load(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OptimizationConfig::default();
        assert_eq!(config.preferred_codec, "vp9");
        assert!(config.enable_adaptive_bitrate);
        assert_eq!(config.max_bandwidth_kbps, 2500);
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.sample_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_ceiling() {
        let config = OptimizationConfig {
            max_bandwidth_kbps: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = OptimizationConfig {
            sample_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merged_keeps_unset_fields() {
        let base = OptimizationConfig::default();
        let merged = base.merged(&ConfigOverride {
            max_bandwidth_kbps: Some(1000),
            enable_adaptive_bitrate: Some(false),
            ..Default::default()
        });

        assert_eq!(merged.max_bandwidth_kbps, 1000);
        assert!(!merged.enable_adaptive_bitrate);
        assert_eq!(merged.preferred_codec, base.preferred_codec);
        assert_eq!(merged.ice_servers, base.ice_servers);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtc.toml");
        std::fs::write(
            &path,
            "[optimizer]\nmax_bandwidth_kbps = 1800\nenable_adaptive_bitrate = false\n\n[logging]\nlevel = \"debug\"\nformat = \"json\"\n",
        )
        .unwrap();

        let config = RtcConfig::load(path.to_str()).unwrap();
        assert_eq!(config.optimizer.max_bandwidth_kbps, 1800);
        assert!(!config.optimizer.enable_adaptive_bitrate);
        assert_eq!(config.optimizer.preferred_codec, "vp9");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = RtcConfig::load(Some("/nonexistent/synctv-rtc.toml")).unwrap();
        assert_eq!(config.optimizer, OptimizationConfig::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: OptimizationConfig =
            serde_json::from_str(r#"{"max_bandwidth_kbps": 4000}"#).unwrap();
        assert_eq!(config.max_bandwidth_kbps, 4000);
        assert_eq!(config.sample_interval_ms, DEFAULT_SAMPLE_INTERVAL_MS);
        assert_eq!(config.preferred_codec, "vp9");
    }
}
