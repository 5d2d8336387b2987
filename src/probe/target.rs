//! Probe target: one configured host and its resolved address.

use std::net::IpAddr;

use thiserror::Error;
use tokio::time::Instant;

use crate::metrics::LabelPair;

/// Failure to map a hostname to a network address.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The resolver failed.
    #[error("failed to resolve '{host}': {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The resolver succeeded but returned nothing.
    #[error("no addresses found for '{host}'")]
    NoAddress { host: String },
}

/// One configured host. Owned exclusively by its scheduler.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    hostname: String,
    address: IpAddr,
    sequence: u64,
    last_reset: Instant,
}

impl ProbeTarget {
    /// Create a target for an already resolved address.
    pub fn new(hostname: impl Into<String>, address: IpAddr) -> Self {
        Self {
            hostname: hostname.into(),
            address,
            sequence: 0,
            last_reset: Instant::now(),
        }
    }

    /// Resolve `hostname` once and build a target for it.
    pub async fn resolve(hostname: &str) -> Result<Self, ResolutionError> {
        let address = resolve(hostname).await?;
        Ok(Self::new(hostname, address))
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn label(&self) -> LabelPair {
        LabelPair::new(self.hostname.clone(), self.address)
    }

    /// Next probe sequence number.
    pub fn new_sequence(&mut self) -> u64 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }

    /// Whether `period` has elapsed since the last counter reset.
    pub fn reset_due(&self, period: std::time::Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_reset) >= period
    }

    pub fn mark_reset(&mut self, now: Instant) {
        self.last_reset = now;
    }
}

/// Resolve hostname to IP address.
pub async fn resolve(host: &str) -> Result<IpAddr, ResolutionError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|source| ResolutionError::Lookup {
            host: host.to_string(),
            source,
        })?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| ResolutionError::NoAddress {
            host: host.to_string(),
        })
}
