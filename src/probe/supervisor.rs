//! Spawns and tracks one probe task per configured host.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::scheduler::{ProbeScheduler, ProbeSettings};
use super::target::ProbeTarget;
use super::transport::Connector;
use crate::metrics::ProbeMetrics;

/// Default time to wait for aborted probe tasks to wind down.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Metadata about a spawned probe task.
#[derive(Debug, Clone)]
pub struct ProbeJob {
    /// Configured hostname.
    pub host: String,
    /// Whether the task is still running.
    pub running: bool,
}

/// Owns the probe tasks.
///
/// Each task resolves its host, connects a transport, then runs its
/// scheduler until aborted. A task that fails to start ends on its own
/// without affecting its siblings.
pub struct ProbeSupervisor<C> {
    connector: Arc<C>,
    metrics: Arc<ProbeMetrics>,
    settings: ProbeSettings,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl<C> std::fmt::Debug for ProbeSupervisor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeSupervisor")
            .field("settings", &self.settings)
            .field("task_count", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ProbeSupervisor<C> {
    pub fn new(connector: C, metrics: Arc<ProbeMetrics>, settings: ProbeSettings) -> Self {
        Self {
            connector: Arc::new(connector),
            metrics,
            settings,
            tasks: Vec::new(),
        }
    }

    /// Spawn the probe task for `host`.
    pub fn spawn(&mut self, host: impl Into<String>) {
        let host = host.into();
        let connector = Arc::clone(&self.connector);
        let metrics = Arc::clone(&self.metrics);
        let settings = self.settings.clone();

        let task_host = host.clone();
        let handle = tokio::spawn(async move {
            run_target(task_host, connector, metrics, settings).await;
        });

        tracing::info!(host = %host, "Probe task spawned");
        self.tasks.push((host, handle));
    }

    /// Spawn one task per host.
    pub fn spawn_all<I, S>(&mut self, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for host in hosts {
            self.spawn(host);
        }
    }

    /// All spawned tasks, in spawn order.
    pub fn jobs(&self) -> Vec<ProbeJob> {
        self.tasks
            .iter()
            .map(|(host, handle)| ProbeJob {
                host: host.clone(),
                running: !handle.is_finished(),
            })
            .collect()
    }

    /// Hosts whose task is still running.
    pub fn running_hosts(&self) -> Vec<String> {
        self.jobs()
            .into_iter()
            .filter(|job| job.running)
            .map(|job| job.host)
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Abort every probe task with the default timeout.
    pub async fn shutdown(self) {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Abort every probe task, waiting at most `timeout` for them to stop.
    pub async fn shutdown_with_timeout(self, timeout: Duration) {
        let count = self.tasks.len();
        for (_, handle) in &self.tasks {
            handle.abort();
        }

        let drain = async {
            for (_, handle) in self.tasks {
                // Cancelled or already finished: both fine here.
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            tracing::warn!(task_count = count, "Probe task shutdown timed out");
        } else {
            tracing::info!(task_count = count, "Probe tasks stopped");
        }
    }
}

/// Task body for one host.
async fn run_target<C: Connector>(
    host: String,
    connector: Arc<C>,
    metrics: Arc<ProbeMetrics>,
    settings: ProbeSettings,
) {
    tracing::debug!(host = %host, "Starting prober");

    let target = match ProbeTarget::resolve(&host).await {
        Ok(target) => target,
        Err(e) => {
            tracing::error!(host = %host, error = %e, "Failed to resolve target, not probing it");
            return;
        }
    };

    let transport = match connector.connect(&target).await {
        Ok(transport) => transport,
        Err(e) => {
            tracing::error!(
                host = %host,
                ip = %target.address(),
                error = %e,
                "Failed to create prober, not probing it"
            );
            return;
        }
    };

    ProbeScheduler::new(target, transport, metrics, settings)
        .run()
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{LabelPair, PacketCounts};
    use crate::probe::transport::{EchoOutcome, EchoTransport, TransportError};
    use std::net::IpAddr;

    /// Refuses to connect to `refuse`; every other address answers after
    /// an RTT derived from its last octet.
    struct FakeConnector {
        refuse: Option<IpAddr>,
    }

    struct FakeTransport {
        rtt: Duration,
    }

    #[async_trait::async_trait]
    impl EchoTransport for FakeTransport {
        async fn echo(&mut self, _seq: u16, _timeout: Duration) -> Result<EchoOutcome, TransportError> {
            tokio::time::sleep(self.rtt).await;
            Ok(EchoOutcome::Reply { rtt: self.rtt })
        }
    }

    #[async_trait::async_trait]
    impl Connector for FakeConnector {
        type Transport = FakeTransport;

        async fn connect(&self, target: &ProbeTarget) -> Result<FakeTransport, TransportError> {
            if Some(target.address()) == self.refuse {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "raw socket not permitted",
                )));
            }
            let octet = match target.address() {
                IpAddr::V4(v4) => v4.octets()[3],
                IpAddr::V6(_) => 1,
            };
            Ok(FakeTransport {
                rtt: Duration::from_millis(u64::from(octet)),
            })
        }
    }

    fn metrics() -> Arc<ProbeMetrics> {
        Arc::new(ProbeMetrics::new("0.005,0.05,0.5".parse().unwrap()))
    }

    fn label(ip: &str) -> LabelPair {
        LabelPair::new(ip, ip.parse().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_target_does_not_stop_others() {
        let metrics = metrics();
        let connector = FakeConnector {
            refuse: Some("127.0.0.2".parse().unwrap()),
        };
        let mut supervisor = ProbeSupervisor::new(connector, Arc::clone(&metrics), ProbeSettings::default());
        supervisor.spawn_all(["127.0.0.1", "127.0.0.2"]);
        assert_eq!(supervisor.task_count(), 2);

        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(supervisor.running_hosts(), vec!["127.0.0.1".to_string()]);
        let packets = metrics.packets(&label("127.0.0.1")).unwrap();
        assert_eq!(packets, PacketCounts::new(4, 4));
        assert!(metrics.packets(&label("127.0.0.2")).is_none());
        assert_eq!(metrics.series_count(), 1);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_unresolvable_host_ends_its_task() {
        let metrics = metrics();
        let mut supervisor = ProbeSupervisor::new(
            FakeConnector { refuse: None },
            Arc::clone(&metrics),
            ProbeSettings::default(),
        );
        supervisor.spawn("no-such-host.invalid");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
        while !supervisor.running_hosts().is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "resolution never failed");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(supervisor.jobs()[0].host, "no-such-host.invalid");
        assert_eq!(metrics.series_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_targets_keep_their_own_series() {
        let metrics = metrics();
        let mut supervisor = ProbeSupervisor::new(
            FakeConnector { refuse: None },
            Arc::clone(&metrics),
            ProbeSettings::default(),
        );
        supervisor.spawn_all(["127.0.0.3", "127.0.0.200"]);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        supervisor.shutdown().await;

        let snap = metrics.snapshot();
        assert_eq!(snap.series.len(), 2);

        let fast = snap.get(&label("127.0.0.3")).unwrap();
        let slow = snap.get(&label("127.0.0.200")).unwrap();
        // 3ms replies land in the first bucket only; 200ms replies only in the third.
        assert_eq!(fast.histogram.buckets[0].1, fast.histogram.count);
        assert_eq!(slow.histogram.buckets[0].1, 0);
        assert_eq!(slow.histogram.buckets[1].1, 0);
        assert_eq!(slow.histogram.buckets[2].1, slow.histogram.count);
        assert!(fast.packets.sent > 0 && slow.packets.sent > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_probing() {
        let metrics = metrics();
        let mut supervisor = ProbeSupervisor::new(
            FakeConnector { refuse: None },
            Arc::clone(&metrics),
            ProbeSettings::default(),
        );
        supervisor.spawn("127.0.0.9");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        supervisor.shutdown().await;

        let before = metrics.packets(&label("127.0.0.9")).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(metrics.packets(&label("127.0.0.9")).unwrap(), before);
    }
}
