//! scaledown.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScaleDownConfig {
    #[serde(default)]
    pub eviction: EvictionConfig,
    #[serde(default)]
    pub batcher: BatcherConfig,
}

/// Pod eviction timings. Carried through to the evictor, never
/// interpreted by the scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvictionConfig {
    pub eviction_retry_time: Option<String>,
    pub ds_eviction_retry_time: Option<String>,
    pub ds_eviction_empty_node_timeout: Option<String>,
    pub pod_eviction_headroom: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatcherConfig {
    /// How long the batcher collects nodes per group before deleting
    /// them in one call. "0s" deletes immediately.
    pub delete_interval: Option<String>,
}

/// Resolved eviction timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionSettings {
    pub eviction_retry_time: Duration,
    pub ds_eviction_retry_time: Duration,
    pub ds_eviction_empty_node_timeout: Duration,
    pub pod_eviction_headroom: Duration,
}

pub const DEFAULT_EVICTION_RETRY_TIME: Duration = Duration::from_secs(10);
pub const DEFAULT_DS_EVICTION_RETRY_TIME: Duration = Duration::from_secs(3);
pub const DEFAULT_DS_EVICTION_EMPTY_NODE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POD_EVICTION_HEADROOM: Duration = Duration::from_secs(30);

impl Default for EvictionSettings {
    fn default() -> Self {
        Self {
            eviction_retry_time: DEFAULT_EVICTION_RETRY_TIME,
            ds_eviction_retry_time: DEFAULT_DS_EVICTION_RETRY_TIME,
            ds_eviction_empty_node_timeout: DEFAULT_DS_EVICTION_EMPTY_NODE_TIMEOUT,
            pod_eviction_headroom: DEFAULT_POD_EVICTION_HEADROOM,
        }
    }
}

impl ScaleDownConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScaleDownConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The defaults, spelled out, as a TOML document.
    pub fn default_toml() -> ConfigResult<String> {
        let config = ScaleDownConfig {
            eviction: EvictionConfig {
                eviction_retry_time: Some("10s".to_string()),
                ds_eviction_retry_time: Some("3s".to_string()),
                ds_eviction_empty_node_timeout: Some("10s".to_string()),
                pod_eviction_headroom: Some("30s".to_string()),
            },
            batcher: BatcherConfig {
                delete_interval: Some("0s".to_string()),
            },
        };
        config.to_toml_string()
    }

    pub fn eviction_settings(&self) -> ConfigResult<EvictionSettings> {
        let e = &self.eviction;
        Ok(EvictionSettings {
            eviction_retry_time: resolve(
                "eviction.eviction_retry_time",
                e.eviction_retry_time.as_deref(),
                DEFAULT_EVICTION_RETRY_TIME,
            )?,
            ds_eviction_retry_time: resolve(
                "eviction.ds_eviction_retry_time",
                e.ds_eviction_retry_time.as_deref(),
                DEFAULT_DS_EVICTION_RETRY_TIME,
            )?,
            ds_eviction_empty_node_timeout: resolve(
                "eviction.ds_eviction_empty_node_timeout",
                e.ds_eviction_empty_node_timeout.as_deref(),
                DEFAULT_DS_EVICTION_EMPTY_NODE_TIMEOUT,
            )?,
            pod_eviction_headroom: resolve(
                "eviction.pod_eviction_headroom",
                e.pod_eviction_headroom.as_deref(),
                DEFAULT_POD_EVICTION_HEADROOM,
            )?,
        })
    }

    pub fn delete_interval(&self) -> ConfigResult<Duration> {
        resolve(
            "batcher.delete_interval",
            self.batcher.delete_interval.as_deref(),
            Duration::ZERO,
        )
    }
}

fn resolve(field: &'static str, value: Option<&str>, default: Duration) -> ConfigResult<Duration> {
    match value {
        None => Ok(default),
        Some(v) => parse_duration(v).ok_or_else(|| ConfigError::InvalidDuration {
            field,
            value: v.to_string(),
        }),
    }
}

/// Parse a duration string like "500ms", "30s", "5m", or a bare number of
/// seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("18446744073709551615m"), None);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ScaleDownConfig = toml::from_str("").unwrap();
        assert_eq!(config.eviction_settings().unwrap(), EvictionSettings::default());
        assert_eq!(config.delete_interval().unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_partial() {
        let toml_str = r#"
[eviction]
pod_eviction_headroom = "45s"

[batcher]
delete_interval = "250ms"
"#;
        let config: ScaleDownConfig = toml::from_str(toml_str).unwrap();
        let settings = config.eviction_settings().unwrap();
        assert_eq!(settings.pod_eviction_headroom, Duration::from_secs(45));
        assert_eq!(settings.eviction_retry_time, DEFAULT_EVICTION_RETRY_TIME);
        assert_eq!(config.delete_interval().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_duration_names_field() {
        let toml_str = r#"
[batcher]
delete_interval = "never"
"#;
        let config: ScaleDownConfig = toml::from_str(toml_str).unwrap();
        let err = config.delete_interval().unwrap_err();
        assert!(err.to_string().contains("batcher.delete_interval"));
    }

    #[test]
    fn test_overflowing_minutes_is_config_error() {
        let toml_str = "[batcher]\ndelete_interval = \"18446744073709551615m\"\n";
        let config: ScaleDownConfig = toml::from_str(toml_str).unwrap();
        let err = config.delete_interval().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { field: "batcher.delete_interval", .. }));
    }

    #[test]
    fn test_default_toml_round_trips_to_defaults() {
        let rendered = ScaleDownConfig::default_toml().unwrap();
        assert!(rendered.contains("pod_eviction_headroom"));
        let config: ScaleDownConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(config.eviction_settings().unwrap(), EvictionSettings::default());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaledown.toml");
        std::fs::write(&path, "[eviction]\neviction_retry_time = \"1m\"\n").unwrap();

        let config = ScaleDownConfig::from_file(&path).unwrap();
        assert_eq!(
            config.eviction_settings().unwrap().eviction_retry_time,
            Duration::from_secs(60)
        );
    }
}
