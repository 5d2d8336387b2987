//! Aggregate registry: per-label-pair packet counters and latency aggregates.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::histogram::{Buckets, HistogramSnapshot, LatencyHistogram};
use super::summary::{LatencySummary, SummaryOpts, SummarySnapshot};

/// The `(hostname, resolved_address)` pair identifying one metric series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelPair {
    pub host: String,
    pub ip: IpAddr,
}

impl LabelPair {
    pub fn new(host: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            host: host.into(),
            ip,
        }
    }
}

impl fmt::Display for LabelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.host, self.ip)
    }
}

/// Packet counters for one series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketCounts {
    pub sent: u64,
    pub received: u64,
}

impl PacketCounts {
    pub const fn new(sent: u64, received: u64) -> Self {
        Self { sent, received }
    }

    /// Packets sent without a matching reply.
    pub fn lost(&self) -> u64 {
        self.sent.saturating_sub(self.received)
    }
}

/// Consistent view of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub label: LabelPair,
    pub packets: PacketCounts,
    pub summary: SummarySnapshot,
    pub histogram: HistogramSnapshot,
}

/// Consistent view of all series, ordered by label pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub series: Vec<SeriesSnapshot>,
}

impl MetricsSnapshot {
    pub fn get(&self, label: &LabelPair) -> Option<&SeriesSnapshot> {
        self.series.iter().find(|s| &s.label == label)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[derive(Debug)]
struct Series {
    packets: PacketCounts,
    summary: LatencySummary,
    histogram: LatencyHistogram,
}

/// Process-wide aggregate state, shared by every probe scheduler (writers)
/// and the exposition endpoint (readers).
///
/// Each label pair owns one mutex-guarded entry and every operation holds at
/// most one entry lock, so a reader never observes a half-applied update.
/// Entries are created on first use and never removed.
pub struct ProbeMetrics {
    buckets: Buckets,
    summary_opts: SummaryOpts,
    series: RwLock<BTreeMap<LabelPair, Arc<Mutex<Series>>>>,
}

impl fmt::Debug for ProbeMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeMetrics")
            .field("buckets", &self.buckets)
            .field("series_count", &self.series_count())
            .finish_non_exhaustive()
    }
}

impl ProbeMetrics {
    /// Create a registry whose histograms use `buckets`.
    pub fn new(buckets: Buckets) -> Self {
        Self::with_summary_opts(buckets, SummaryOpts::default())
    }

    pub fn with_summary_opts(buckets: Buckets, summary_opts: SummaryOpts) -> Self {
        Self {
            buckets,
            summary_opts,
            series: RwLock::new(BTreeMap::new()),
        }
    }

    /// Count one echo request sent to `label`.
    pub fn record_sent(&self, label: &LabelPair) {
        let entry = self.entry(label);
        lock(&entry).packets.sent += 1;
    }

    /// Count one echo reply and fold its round-trip time into the summary
    /// and histogram.
    ///
    /// Returns `false` (and records nothing) when the series has no
    /// outstanding send to match.
    pub fn record_received(&self, label: &LabelPair, rtt: Duration) -> bool {
        let entry = self.entry(label);
        let mut series = lock(&entry);
        if series.packets.received >= series.packets.sent {
            tracing::warn!(host = %label.host, ip = %label.ip, "Reply without outstanding request, ignoring");
            return false;
        }

        let secs = rtt.as_secs_f64();
        series.packets.received += 1;
        series.summary.observe(secs, Instant::now());
        series.histogram.observe(secs);
        true
    }

    /// Overwrite the packet counters of `label` at the end of a round.
    ///
    /// Both counters change in one critical section; `received` is clamped
    /// to `sent`. Latency aggregates are append-only and left untouched.
    pub fn record_finished(&self, label: &LabelPair, counts: PacketCounts) {
        let entry = self.entry(label);
        lock(&entry).packets = PacketCounts {
            sent: counts.sent,
            received: counts.received.min(counts.sent),
        };
    }

    /// Read every series. Each series is copied under its own lock.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let entries: Vec<(LabelPair, Arc<Mutex<Series>>)> = self
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(label, entry)| (label.clone(), Arc::clone(entry)))
            .collect();

        let now = Instant::now();
        let series = entries
            .into_iter()
            .map(|(label, entry)| {
                let mut s = lock(&entry);
                SeriesSnapshot {
                    label,
                    packets: s.packets,
                    summary: s.summary.snapshot(now),
                    histogram: s.histogram.snapshot(),
                }
            })
            .collect();

        MetricsSnapshot { series }
    }

    /// Packet counters for a single series, if it exists.
    pub fn packets(&self, label: &LabelPair) -> Option<PacketCounts> {
        let entry = self
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(label)
            .cloned()?;
        let packets = lock(&entry).packets;
        Some(packets)
    }

    pub fn series_count(&self) -> usize {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn entry(&self, label: &LabelPair) -> Arc<Mutex<Series>> {
        if let Some(entry) = self
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(label)
        {
            return Arc::clone(entry);
        }

        let mut map = self.series.write().unwrap_or_else(PoisonError::into_inner);
        let entry = map.entry(label.clone()).or_insert_with(|| {
            tracing::debug!(host = %label.host, ip = %label.ip, "New metric series");
            Arc::new(Mutex::new(Series {
                packets: PacketCounts::default(),
                summary: LatencySummary::new(&self.summary_opts, Instant::now()),
                histogram: LatencyHistogram::new(self.buckets.clone()),
            }))
        });
        Arc::clone(entry)
    }
}

/// Series updates never leave an entry half-written, so a poisoned lock
/// still guards consistent data.
fn lock(entry: &Mutex<Series>) -> MutexGuard<'_, Series> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}
