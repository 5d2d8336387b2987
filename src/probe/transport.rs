//! Echo transport capability used by the probe scheduler.
//!
//! The scheduler never touches sockets itself. A [`Connector`] builds one
//! [`EchoTransport`] per target at startup, and the scheduler calls
//! [`EchoTransport::echo`] once per cycle.

use std::time::Duration;

use thiserror::Error;

use super::target::ProbeTarget;

/// Transport failures.
///
/// At connect time these stop the affected target; during a cycle they are
/// logged and counted as a lost probe.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket creation or I/O failed (e.g. missing raw socket permission).
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// The echo could not be sent or its reply could not be parsed.
    #[error("echo failed: {0}")]
    Echo(String),
}

/// Result of one echo exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoOutcome {
    /// A reply matching the request arrived after `rtt`.
    Reply { rtt: Duration },
    /// No matching reply before the timeout.
    Timeout,
}

/// One target's echo channel.
///
/// Implementations must match replies to the sequence number they were
/// sent with and drop duplicates, so each call yields at most one reply.
#[async_trait::async_trait]
pub trait EchoTransport: Send + 'static {
    /// Send one echo request with wire sequence `seq` and wait up to
    /// `timeout` for its reply.
    async fn echo(&mut self, seq: u16, timeout: Duration) -> Result<EchoOutcome, TransportError>;
}

/// Builds per-target transports.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: EchoTransport;

    async fn connect(&self, target: &ProbeTarget) -> Result<Self::Transport, TransportError>;
}
