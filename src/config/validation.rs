//! Configuration validation utilities.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::metrics::BucketError;

/// Exit status for unusable histogram buckets.
pub const EXIT_INVALID_BUCKETS: u8 = 10;

/// Exit status for any other configuration error.
pub const EXIT_INVALID_CONFIG: u8 = 2;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),

    /// Histogram buckets could not be parsed.
    #[error("invalid histogram buckets: {0}")]
    Buckets(#[from] BucketError),
}

impl ConfigError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Buckets(_) => EXIT_INVALID_BUCKETS,
            _ => EXIT_INVALID_CONFIG,
        }
    }
}

/// Parse duration string using humantime.
///
/// Supports various formats: `30s`, `1m`, `5m30s`, `1h`, `100ms`, etc.
/// A bare integer is taken as whole seconds.
///
/// # Examples
///
/// ```
/// use smokeprobe::config::parse_duration;
///
/// assert_eq!(parse_duration("1s").unwrap().as_secs(), 1);
/// assert_eq!(parse_duration("5m").unwrap().as_secs(), 300);
/// assert_eq!(parse_duration("250ms").unwrap().as_millis(), 250);
/// assert_eq!(parse_duration("2").unwrap().as_secs(), 2);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Normalize a listen address into a bindable `host:port` string.
///
/// Accepts socket addresses, `hostname:port` (resolved at bind time) and the
/// `:port` shorthand for all IPv4 interfaces.
pub fn parse_listen_address(s: &str) -> Result<String, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::ValidationError(format!("invalid listen address: '{s}'"));

    let candidate = if s.starts_with(':') {
        format!("0.0.0.0{s}")
    } else {
        s.to_string()
    };
    if candidate.parse::<SocketAddr>().is_ok() {
        return Ok(candidate);
    }

    let (host, port) = candidate.rsplit_once(':').ok_or_else(invalid)?;
    // Unbracketed IPv6 or an empty host cannot be told apart from the port.
    if host.is_empty() || host.contains(':') || port.parse::<u16>().is_err() {
        return Err(invalid());
    }
    Ok(candidate)
}

/// Check a scrape path: absolute and not the root page.
pub fn validate_telemetry_path(path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') {
        return Err(ConfigError::ValidationError(format!(
            "telemetry path must start with '/': '{path}'"
        )));
    }
    if path == "/" {
        return Err(ConfigError::ValidationError(
            "telemetry path must not be '/'".to_string(),
        ));
    }
    Ok(())
}
