//! Smokeprobe - smokeping-style latency prober
//!
//! This crate continuously sends ICMP echo requests to a set of hosts and
//! exposes the aggregate results in the Prometheus text format. It can be
//! used as a library, or run as a standalone binary with the `smokeprobe`
//! executable.
//!
//! # Architecture
//!
//! - **Probe**: one task per host; resolve, echo, record, sleep
//! - **Metrics**: per-target packet counters, latency summary and histogram
//! - **Server**: the scrape endpoint and a landing page
//! - **Config**: YAML file plus command-line overrides
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use smokeprobe::metrics::{Exposition, ProbeMetrics};
//! use smokeprobe::probe::{IcmpConnector, ProbeSettings, ProbeSupervisor};
//! use smokeprobe::server::{AppState, create_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let metrics = Arc::new(ProbeMetrics::new(smokeprobe::DEFAULT_BUCKETS.parse()?));
//!     let exposition = Arc::new(Exposition::new(Arc::clone(&metrics))?);
//!
//!     let mut supervisor =
//!         ProbeSupervisor::new(IcmpConnector::new(false), metrics, ProbeSettings::default());
//!     supervisor.spawn_all(["example.org"]);
//!
//!     let app = create_router(AppState::new(exposition, "/metrics"));
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:9374").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod probe;
pub mod server;

pub use config::{AppConfig, ConfigError, DEFAULT_BUCKETS};
pub use metrics::{Buckets, Exposition, LabelPair, MetricsError, PacketCounts, ProbeMetrics};
pub use probe::{
    Connector, CounterMode, EchoOutcome, EchoTransport, IcmpConnector, ProbeSettings,
    ProbeSupervisor, ProbeTarget, TransportError,
};
