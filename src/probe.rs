//! Probe Layer
//!
//! One independent probe task per configured host. Each task owns a
//! [`ProbeTarget`] and a transport, and folds every outcome into the shared
//! [`ProbeMetrics`](crate::metrics::ProbeMetrics).
//!
//! # Architecture
//!
//! - [`ProbeTarget`]: hostname, resolved address, sequence counter
//! - [`Connector`] / [`EchoTransport`]: the echo capability the scheduler calls into
//! - [`IcmpConnector`]: ICMP implementation on top of `surge-ping`
//! - [`ProbeScheduler`]: the per-target send / await / record / sleep loop
//! - [`ProbeSupervisor`]: spawns and tears down the per-target tasks
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use smokeprobe::metrics::ProbeMetrics;
//! use smokeprobe::probe::{IcmpConnector, ProbeSettings, ProbeSupervisor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(ProbeMetrics::new("0.01,0.1,1".parse()?));
//! let mut supervisor =
//!     ProbeSupervisor::new(IcmpConnector::new(true), metrics, ProbeSettings::default());
//! supervisor.spawn_all(["example.org", "192.0.2.1"]);
//! # Ok(())
//! # }
//! ```

mod icmp;
mod scheduler;
mod supervisor;
mod target;
mod transport;

pub use icmp::{DEFAULT_PAYLOAD_SIZE, IcmpConnector, IcmpTransport};
pub use scheduler::{
    CounterMode, CycleOutcome, DEFAULT_INTERVAL, DEFAULT_TIMEOUT, ProbeScheduler, ProbeSettings,
    ProbeState,
};
pub use supervisor::{DEFAULT_SHUTDOWN_TIMEOUT, ProbeJob, ProbeSupervisor};
pub use target::{ProbeTarget, ResolutionError, resolve};
pub use transport::{Connector, EchoOutcome, EchoTransport, TransportError};
