//! Per-target probe scheduler.
//!
//! One scheduler owns one [`ProbeTarget`] and its transport and cycles
//! through `Idle → Sending → AwaitingReply → (Recorded | TimedOut) → Idle`
//! forever. Cycles for a target never overlap; the only suspension points
//! are the reply wait and the inter-cycle sleep.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};

use super::target::ProbeTarget;
use super::transport::{EchoOutcome, EchoTransport};
use crate::metrics::{LabelPair, PacketCounts, ProbeMetrics};

/// Default probe interval (1 second).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Default reply timeout (1 second).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// How packet counters evolve over the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterMode {
    /// Counters only grow.
    #[default]
    Cumulative,
    /// Counters are zeroed every period, at a round boundary.
    Reset(Duration),
}

impl fmt::Display for CounterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cumulative => write!(f, "cumulative"),
            Self::Reset(period) => write!(f, "reset every {}", humantime::format_duration(*period)),
        }
    }
}

/// Probe timing shared by all schedulers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub counter_mode: CounterMode,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            counter_mode: CounterMode::Cumulative,
        }
    }
}

impl ProbeSettings {
    /// Set the probe interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the counter mode.
    pub fn with_counter_mode(mut self, counter_mode: CounterMode) -> Self {
        self.counter_mode = counter_mode;
        self
    }
}

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Sending,
    AwaitingReply,
    Recorded,
    TimedOut,
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::AwaitingReply => "awaiting_reply",
            Self::Recorded => "recorded",
            Self::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// What a single cycle observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Reply recorded with this round-trip time.
    Replied(Duration),
    /// No reply before the timeout.
    TimedOut,
    /// The transport failed; counted like a timeout.
    Failed,
}

/// Drives probes for a single target.
pub struct ProbeScheduler<T> {
    target: ProbeTarget,
    label: LabelPair,
    transport: T,
    metrics: Arc<ProbeMetrics>,
    settings: ProbeSettings,
    state: ProbeState,
}

impl<T> fmt::Debug for ProbeScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeScheduler")
            .field("target", &self.target)
            .field("settings", &self.settings)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T: EchoTransport> ProbeScheduler<T> {
    pub fn new(
        target: ProbeTarget,
        transport: T,
        metrics: Arc<ProbeMetrics>,
        settings: ProbeSettings,
    ) -> Self {
        let label = target.label();
        Self {
            target,
            label,
            transport,
            metrics,
            settings,
            state: ProbeState::Idle,
        }
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// Probe forever: one cycle, then sleep for the interval.
    ///
    /// The effective cadence is `interval` plus the cycle's own duration.
    pub async fn run(mut self) {
        tracing::info!(
            host = %self.label.host,
            ip = %self.label.ip,
            interval = ?self.settings.interval,
            timeout = ?self.settings.timeout,
            counters = %self.settings.counter_mode,
            "Probe scheduler started"
        );
        loop {
            self.cycle().await;
            sleep(self.settings.interval).await;
        }
    }

    /// Run one probe cycle, starting and ending in [`ProbeState::Idle`].
    pub async fn cycle(&mut self) -> CycleOutcome {
        self.transition(ProbeState::Sending);
        self.metrics.record_sent(&self.label);
        let seq = self.target.new_sequence();
        // ICMP carries 16 bits of sequence.
        let wire_seq = seq as u16;

        self.transition(ProbeState::AwaitingReply);
        let probe_timeout = self.settings.timeout;
        let result = timeout(probe_timeout, self.transport.echo(wire_seq, probe_timeout)).await;

        let outcome = match result {
            Ok(Ok(EchoOutcome::Reply { rtt })) => {
                self.transition(ProbeState::Recorded);
                self.metrics.record_received(&self.label, rtt);
                tracing::debug!(
                    host = %self.label.host,
                    ip = %self.label.ip,
                    seq,
                    rtt_ms = rtt.as_secs_f64() * 1000.0,
                    "Echo reply received"
                );
                CycleOutcome::Replied(rtt)
            }
            Ok(Ok(EchoOutcome::Timeout)) | Err(_) => {
                self.transition(ProbeState::TimedOut);
                tracing::debug!(
                    host = %self.label.host,
                    ip = %self.label.ip,
                    seq,
                    timeout_ms = probe_timeout.as_millis(),
                    "Echo timed out"
                );
                CycleOutcome::TimedOut
            }
            Ok(Err(e)) => {
                self.transition(ProbeState::TimedOut);
                tracing::warn!(
                    host = %self.label.host,
                    ip = %self.label.ip,
                    seq,
                    error = %e,
                    "Echo failed"
                );
                CycleOutcome::Failed
            }
        };

        self.finish_round();
        self.transition(ProbeState::Idle);
        outcome
    }

    /// Round boundary: no request is outstanding here, so this is the only
    /// place a periodic reset may happen.
    fn finish_round(&mut self) {
        let CounterMode::Reset(period) = self.settings.counter_mode else {
            return;
        };
        let now = Instant::now();
        if !self.target.reset_due(period, now) {
            return;
        }

        self.metrics
            .record_finished(&self.label, PacketCounts::default());
        self.target.mark_reset(now);
        tracing::debug!(host = %self.label.host, ip = %self.label.ip, "Packet counters reset");
    }

    fn transition(&mut self, next: ProbeState) {
        tracing::trace!(host = %self.label.host, from = %self.state, to = %next, "Probe state");
        self.state = next;
    }
}
