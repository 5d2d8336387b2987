//! Configuration module for the smokeping prober.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Probe targets and timing (interval, timeout, counter reset period)
//! - Histogram bucket boundaries
//! - Exposition endpoint (listen address, telemetry path)
//!
//! Command-line flags override file values; see the binary for the merge.

mod app;
mod validation;

pub use app::{AppConfig, PingConfig, WebConfig};
pub use validation::{
    ConfigError, EXIT_INVALID_BUCKETS, EXIT_INVALID_CONFIG, parse_duration, parse_listen_address,
    validate_telemetry_path,
};

// Re-export constants
pub use app::{DEFAULT_BUCKETS, DEFAULT_LISTEN_ADDRESS, DEFAULT_TELEMETRY_PATH};
