//! ICMP echo transport backed by `surge-ping`.

use std::net::IpAddr;
use std::time::Duration;

use socket2::Type;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, Pinger, SurgeError};

use super::target::ProbeTarget;
use super::transport::{Connector, EchoOutcome, EchoTransport, TransportError};

/// Echo payload size in bytes.
pub const DEFAULT_PAYLOAD_SIZE: usize = 24;

/// Creates one ICMP client per target.
#[derive(Debug, Clone)]
pub struct IcmpConnector {
    privileged: bool,
    payload_size: usize,
}

impl IcmpConnector {
    /// `privileged` selects raw sockets; otherwise datagram ICMP sockets
    /// are used (needs `net.ipv4.ping_group_range` on Linux).
    pub fn new(privileged: bool) -> Self {
        Self {
            privileged,
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }

    pub fn with_payload_size(mut self, payload_size: usize) -> Self {
        self.payload_size = payload_size;
        self
    }

    fn client_config(&self, address: IpAddr) -> Config {
        let sock_type = if self.privileged { Type::RAW } else { Type::DGRAM };
        let kind = match address {
            IpAddr::V4(_) => ICMP::V4,
            IpAddr::V6(_) => ICMP::V6,
        };
        Config::builder().kind(kind).sock_type_hint(sock_type).build()
    }
}

#[async_trait::async_trait]
impl Connector for IcmpConnector {
    type Transport = IcmpTransport;

    async fn connect(&self, target: &ProbeTarget) -> Result<IcmpTransport, TransportError> {
        let client = Client::new(&self.client_config(target.address()))?;
        let pinger = client
            .pinger(target.address(), PingIdentifier(rand::random()))
            .await;

        tracing::debug!(
            host = %target.hostname(),
            ip = %target.address(),
            privileged = self.privileged,
            "ICMP client created"
        );

        Ok(IcmpTransport {
            address: target.address(),
            _client: client,
            pinger,
            payload: vec![0; self.payload_size],
        })
    }
}

/// ICMP echo channel for one address.
pub struct IcmpTransport {
    address: IpAddr,
    // Owns the receive task feeding `pinger`.
    _client: Client,
    pinger: Pinger,
    payload: Vec<u8>,
}

impl std::fmt::Debug for IcmpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcmpTransport")
            .field("address", &self.address)
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl EchoTransport for IcmpTransport {
    async fn echo(&mut self, seq: u16, timeout: Duration) -> Result<EchoOutcome, TransportError> {
        self.pinger.timeout(timeout);
        match self.pinger.ping(PingSequence(seq), &self.payload).await {
            Ok((_packet, rtt)) => Ok(EchoOutcome::Reply { rtt }),
            Err(SurgeError::Timeout { .. }) => Ok(EchoOutcome::Timeout),
            Err(SurgeError::IOError(e)) => Err(TransportError::Io(e)),
            Err(e) => Err(TransportError::Echo(e.to_string())),
        }
    }
}
