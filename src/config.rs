use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// GTFS feed locations and refresh cadences.
    pub gtfs: GtfsSyncConfig,
    /// The single stop/route this service reports departures for.
    pub target: TargetStop,
    #[serde(default = "Config::default_bind_addr")]
    pub bind_addr: String,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
}

/// Configuration for the GTFS feed refresh tasks.
#[derive(Debug, Clone, Deserialize)]
pub struct GtfsSyncConfig {
    /// URL of the static GTFS zip (contains stop_times.txt, routes.txt, ...).
    pub static_feed_url: String,
    /// URL of the GTFS-RT VehiclePosition protobuf feed.
    pub realtime_feed_url: String,
    /// Directory for the cached static zip and its download metadata.
    #[serde(default = "GtfsSyncConfig::default_cache_dir")]
    pub cache_dir: String,
    /// Interval in seconds between static feed refreshes (default: daily).
    #[serde(default = "GtfsSyncConfig::default_static_refresh_secs")]
    pub static_refresh_secs: u64,
    /// Interval in seconds between realtime feed refreshes (default: 30).
    #[serde(default = "GtfsSyncConfig::default_realtime_refresh_secs")]
    pub realtime_refresh_secs: u64,
    /// IANA timezone the schedule's time-of-day values are expressed in.
    #[serde(default = "GtfsSyncConfig::default_timezone")]
    pub timezone: String,
}

impl GtfsSyncConfig {
    fn default_cache_dir() -> String {
        "./cache".to_string()
    }
    fn default_static_refresh_secs() -> u64 {
        86400
    }
    fn default_realtime_refresh_secs() -> u64 {
        30
    }
    fn default_timezone() -> String {
        "Europe/Paris".to_string()
    }

    pub fn parsed_timezone(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(timezone = %self.timezone, "Unknown timezone, falling back to Europe/Paris");
            chrono_tz::Europe::Paris
        })
    }

    /// Sanity-check the refresh settings. Panics on values that cannot work,
    /// warns on values that will hammer the upstream feeds.
    pub fn validate(&self) {
        if self.static_feed_url.is_empty() || self.realtime_feed_url.is_empty() {
            panic!("GTFS configuration error: static_feed_url and realtime_feed_url must be set");
        }
        if self.realtime_refresh_secs == 0 || self.static_refresh_secs == 0 {
            panic!("GTFS configuration error: refresh intervals must be greater than zero");
        }
        if self.realtime_refresh_secs < 5 {
            tracing::warn!(
                interval_secs = self.realtime_refresh_secs,
                "Realtime refresh interval is very aggressive"
            );
        }
    }
}

/// The fixed stop/route the service answers queries for.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetStop {
    /// Matched against stop_times.txt stop_id as raw text.
    pub stop_id: String,
    /// Matched against stop_times.txt stop_sequence as raw text. The feed
    /// encodes this column as text and leading zeros must survive, so it is
    /// never coerced to a number.
    pub stop_sequence: String,
    pub route_id: String,
    /// Display name override; when absent the name is resolved from
    /// routes.txt, falling back to route_id.
    #[serde(default)]
    pub route_name: Option<String>,
}

impl Config {
    fn default_bind_addr() -> String {
        "0.0.0.0:3001".to_string()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
gtfs:
  static_feed_url: https://example.org/GTFS.zip
  realtime_feed_url: https://example.org/VehiclePosition.pb
target:
  stop_id: "264"
  stop_sequence: "1"
  route_id: "4-13"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = serde_yaml::from_str(MINIMAL_YAML).unwrap();
        assert_eq!(config.gtfs.static_refresh_secs, 86400);
        assert_eq!(config.gtfs.realtime_refresh_secs, 30);
        assert_eq!(config.gtfs.cache_dir, "./cache");
        assert_eq!(config.gtfs.timezone, "Europe/Paris");
        assert_eq!(config.bind_addr, "0.0.0.0:3001");
        assert!(config.cors_origins.is_empty());
        assert!(!config.cors_permissive);
        assert_eq!(config.target.route_name, None);
    }

    #[test]
    fn stop_identifiers_stay_textual() {
        let yaml = r#"
gtfs:
  static_feed_url: https://example.org/GTFS.zip
  realtime_feed_url: https://example.org/VehiclePosition.pb
target:
  stop_id: "0264"
  stop_sequence: "01"
  route_id: "4-13"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        // Leading zeros from the config must survive verbatim.
        assert_eq!(config.target.stop_id, "0264");
        assert_eq!(config.target.stop_sequence, "01");
    }

    #[test]
    fn parsed_timezone_accepts_iana_names() {
        let config: Config = serde_yaml::from_str(MINIMAL_YAML).unwrap();
        assert_eq!(config.gtfs.parsed_timezone(), chrono_tz::Europe::Paris);
    }

    #[test]
    fn parsed_timezone_falls_back_on_garbage() {
        let mut config: Config = serde_yaml::from_str(MINIMAL_YAML).unwrap();
        config.gtfs.timezone = "Not/AZone".to_string();
        assert_eq!(config.gtfs.parsed_timezone(), chrono_tz::Europe::Paris);
    }

    #[test]
    #[should_panic(expected = "refresh intervals")]
    fn validate_rejects_zero_interval() {
        let mut config: Config = serde_yaml::from_str(MINIMAL_YAML).unwrap();
        config.gtfs.realtime_refresh_secs = 0;
        config.gtfs.validate();
    }

    #[test]
    #[should_panic(expected = "must be set")]
    fn validate_rejects_empty_feed_url() {
        let mut config: Config = serde_yaml::from_str(MINIMAL_YAML).unwrap();
        config.gtfs.static_feed_url = String::new();
        config.gtfs.validate();
    }
}
