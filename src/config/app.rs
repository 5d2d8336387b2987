//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::{ConfigError, parse_listen_address, validate_telemetry_path};
use crate::metrics::Buckets;
use crate::probe::{CounterMode, DEFAULT_INTERVAL, DEFAULT_PAYLOAD_SIZE, DEFAULT_TIMEOUT, ProbeSettings};

// =============================================================================
// Constants
// =============================================================================

/// Default histogram buckets: exponential, start 5e-05, factor 2, 20 buckets.
pub const DEFAULT_BUCKETS: &str = "5e-05,0.0001,0.0002,0.0004,0.0008,0.0016,0.0032,0.0064,0.0128,0.0256,0.0512,0.1024,0.2048,0.4096,0.8192,1.6384,3.2768,6.5536,13.1072,26.2144";

/// Default listen address.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9374";

/// Default scrape path.
pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";

fn default_buckets() -> String {
    DEFAULT_BUCKETS.to_string()
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_privileged() -> bool {
    true
}

fn default_payload_size() -> usize {
    DEFAULT_PAYLOAD_SIZE
}

// =============================================================================
// Web Configuration
// =============================================================================

/// Exposition endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Address to listen on (default: "0.0.0.0:9374", ":port" accepted).
    pub listen_address: String,

    /// Path serving the metrics (default: "/metrics").
    pub telemetry_path: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            telemetry_path: DEFAULT_TELEMETRY_PATH.to_string(),
        }
    }
}

// =============================================================================
// Ping Configuration
// =============================================================================

/// Probe timing and socket settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingConfig {
    /// Pause between probes of one target (default: 1s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Reply timeout (default: 1s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Use raw ICMP sockets (default: true).
    #[serde(default = "default_privileged")]
    pub privileged: bool,

    /// Zero the packet counters this often; unset keeps them cumulative.
    #[serde(default, with = "humantime_serde")]
    pub reset_period: Option<Duration>,

    /// Echo payload size in bytes (default: 24).
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            privileged: true,
            reset_period: None,
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}

impl PingConfig {
    pub fn counter_mode(&self) -> CounterMode {
        match self.reset_period {
            Some(period) => CounterMode::Reset(period),
            None => CounterMode::Cumulative,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Hosts to probe (names or literal addresses).
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Verbose logging.
    #[serde(default)]
    pub debug: bool,

    /// Comma-separated histogram upper bounds in seconds.
    #[serde(default = "default_buckets")]
    pub buckets: String,

    /// Exposition endpoint configuration.
    #[serde(default)]
    pub web: WebConfig,

    /// Probe configuration.
    #[serde(default)]
    pub ping: PingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            debug: false,
            buckets: default_buckets(),
            web: WebConfig::default(),
            ping: PingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// The result is not validated yet, since command-line overrides are
    /// applied on top of it first.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::Buckets` for unusable buckets and
    /// `ConfigError::ValidationError` for any other invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.histogram_buckets()?;
        self.listen_address()?;
        validate_telemetry_path(&self.web.telemetry_path)?;

        if self.ping.interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "ping interval must be non-zero".to_string(),
            ));
        }

        if self.ping.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "ping timeout must be non-zero".to_string(),
            ));
        }

        if self.ping.reset_period.is_some_and(|p| p.is_zero()) {
            return Err(ConfigError::ValidationError(
                "ping reset_period must be non-zero when set".to_string(),
            ));
        }

        if self.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "host names must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Parsed histogram buckets.
    pub fn histogram_buckets(&self) -> Result<Buckets, ConfigError> {
        Ok(self.buckets.parse()?)
    }

    /// Normalized `host:port` to bind.
    pub fn listen_address(&self) -> Result<String, ConfigError> {
        parse_listen_address(&self.web.listen_address)
    }

    /// Hosts trimmed and de-duplicated, first occurrence first.
    pub fn targets(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.hosts
            .iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty() && seen.insert(h.clone()))
            .collect()
    }

    /// Scheduler settings derived from the ping section.
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings::default()
            .with_interval(self.ping.interval)
            .with_timeout(self.ping.timeout)
            .with_counter_mode(self.ping.counter_mode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.hosts.is_empty());
        assert!(!config.debug);
        assert_eq!(config.web.telemetry_path, "/metrics");
        assert_eq!(config.ping.interval, Duration::from_secs(1));
        assert_eq!(config.ping.timeout, Duration::from_secs(1));
        assert!(config.ping.privileged);
        assert_eq!(config.ping.counter_mode(), CounterMode::Cumulative);
        assert!(config.validate().is_ok());
        assert_eq!(config.histogram_buckets().unwrap().len(), 20);
        assert_eq!(config.listen_address().unwrap(), "0.0.0.0:9374");
    }

    #[test]
    fn test_load_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
hosts:
  - example.org
  - 192.0.2.1
debug: true
buckets: "0.01,0.1,1"
web:
  listen_address: ":9999"
ping:
  interval: 5s
  timeout: 500ms
  privileged: false
  reset_period: 5m
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.hosts, vec!["example.org", "192.0.2.1"]);
        assert!(config.debug);
        assert_eq!(config.web.telemetry_path, "/metrics");
        assert_eq!(config.listen_address().unwrap(), "0.0.0.0:9999");
        assert_eq!(config.ping.payload_size, DEFAULT_PAYLOAD_SIZE);

        let settings = config.probe_settings();
        assert_eq!(settings.interval, Duration::from_secs(5));
        assert_eq!(settings.timeout, Duration::from_millis(500));
        assert_eq!(settings.counter_mode, CounterMode::Reset(Duration::from_secs(300)));
    }

    #[test]
    fn test_load_yaml_payload_and_hostname_listener() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
web:
  listen_address: "localhost:9374"
ping:
  payload_size: 56
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.listen_address().unwrap(), "localhost:9374");
        assert_eq!(config.ping.payload_size, 56);
        assert_eq!(config.ping.interval, DEFAULT_INTERVAL);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load("/nonexistent/smokeprobe.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_invalid_buckets_are_fatal() {
        let config = AppConfig {
            buckets: "0.1,abc,0.3".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Buckets(_)));
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn test_zero_durations_rejected() {
        let mut config = AppConfig::default();
        config.ping.interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.ping.timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.ping.reset_period = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_targets_are_deduplicated() {
        let config = AppConfig {
            hosts: vec![
                "a.example".into(),
                " b.example ".into(),
                "a.example".into(),
            ],
            ..Default::default()
        };
        assert_eq!(config.targets(), vec!["a.example", "b.example"]);
    }
}
