//! Streaming quantile summary over a sliding time window.
//!
//! Quantiles are estimated with the CKMS targeted-quantile algorithm
//! ("Effective Computation of Biased Quantiles over Data Streams",
//! Cormode, Korn, Muthukrishnan, Srivastava). Each objective carries its
//! own rank error bound, so tail quantiles stay tight while the median is
//! allowed to be coarse.
//!
//! The window is split into age buckets: every observation goes into all
//! bucket streams, queries read the oldest one, and the oldest one is
//! cleared and moved to the back each time its slice of the window ends.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Values buffered before being merged into the compressed sample list.
const BUFFER_CAPACITY: usize = 500;

/// Default sliding window for quantile estimation (10 minutes).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(600);

/// Default number of age buckets within the window.
pub const DEFAULT_AGE_BUCKETS: u32 = 5;

/// A target quantile and its allowed absolute rank error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Objective {
    pub quantile: f64,
    pub error: f64,
}

impl Objective {
    pub const fn new(quantile: f64, error: f64) -> Self {
        Self { quantile, error }
    }
}

/// Latency objectives: p50 ±5%, p90 ±1%, p95 ±0.5%, p99 ±0.1%.
pub const DEFAULT_OBJECTIVES: [Objective; 4] = [
    Objective::new(0.5, 0.05),
    Objective::new(0.9, 0.01),
    Objective::new(0.95, 0.005),
    Objective::new(0.99, 0.001),
];

/// Summary tuning.
#[derive(Debug, Clone)]
pub struct SummaryOpts {
    pub objectives: Arc<[Objective]>,
    pub max_age: Duration,
    pub age_buckets: u32,
}

impl Default for SummaryOpts {
    fn default() -> Self {
        Self {
            objectives: Arc::new(DEFAULT_OBJECTIVES),
            max_age: DEFAULT_MAX_AGE,
            age_buckets: DEFAULT_AGE_BUCKETS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    value: f64,
    width: f64,
    delta: f64,
}

/// CKMS stream for a fixed set of objectives.
#[derive(Debug, Clone)]
pub struct QuantileStream {
    objectives: Arc<[Objective]>,
    samples: Vec<Sample>,
    buffer: Vec<f64>,
    n: f64,
}

impl QuantileStream {
    pub fn new(objectives: Arc<[Objective]>) -> Self {
        Self {
            objectives,
            samples: Vec::new(),
            buffer: Vec::with_capacity(BUFFER_CAPACITY),
            n: 0.0,
        }
    }

    pub fn insert(&mut self, value: f64) {
        self.buffer.push(value);
        if self.buffer.len() >= BUFFER_CAPACITY {
            self.flush();
        }
    }

    /// Number of observations seen since the last reset.
    pub fn count(&self) -> u64 {
        self.n as u64 + self.buffer.len() as u64
    }

    /// Estimate quantile `q`; `NaN` when the stream is empty.
    pub fn query(&mut self, q: f64) -> f64 {
        self.flush();
        let Some(first) = self.samples.first().copied() else {
            return f64::NAN;
        };

        let mut t = (q * self.n).ceil();
        t += (self.invariant(t) / 2.0).ceil();

        let mut prev = first;
        let mut rank = 0.0;
        for cur in &self.samples[1..] {
            rank += prev.width;
            if rank + cur.width + cur.delta > t {
                return prev.value;
            }
            prev = *cur;
        }
        prev.value
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.buffer.clear();
        self.n = 0.0;
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let mut batch = std::mem::take(&mut self.buffer);
        batch.sort_by(f64::total_cmp);
        self.merge(&batch);
        batch.clear();
        self.buffer = batch;
    }

    /// Allowed error `f(r, n)` at rank `r`, minimised over all objectives.
    fn invariant(&self, rank: f64) -> f64 {
        self.objectives
            .iter()
            .map(|o| {
                if o.quantile * self.n <= rank {
                    2.0 * o.error * rank / o.quantile
                } else {
                    2.0 * o.error * (self.n - rank) / (1.0 - o.quantile)
                }
            })
            .fold(f64::MAX, f64::min)
    }

    /// Merge sorted values into the sample list.
    fn merge(&mut self, sorted: &[f64]) {
        let mut rank = 0.0;
        let mut i = 0;
        for &value in sorted {
            let mut placed = false;
            while i < self.samples.len() {
                let cur = self.samples[i];
                if cur.value > value {
                    let delta = (self.invariant(rank).floor() - 1.0).max(0.0);
                    self.samples.insert(
                        i,
                        Sample {
                            value,
                            width: 1.0,
                            delta,
                        },
                    );
                    i += 1;
                    placed = true;
                    break;
                }
                rank += cur.width;
                i += 1;
            }
            if !placed {
                self.samples.push(Sample {
                    value,
                    width: 1.0,
                    delta: 0.0,
                });
                i += 1;
            }
            self.n += 1.0;
            rank += 1.0;
        }
        self.compress();
    }

    fn compress(&mut self) {
        if self.samples.len() < 2 {
            return;
        }
        let mut xi = self.samples.len() - 1;
        let mut x = self.samples[xi];
        let mut rank = self.n - 1.0 - x.width;

        for i in (0..xi).rev() {
            let cur = self.samples[i];
            if cur.width + x.width + x.delta <= self.invariant(rank) {
                x.width += cur.width;
                self.samples[xi] = x;
                self.samples.remove(i);
                xi -= 1;
            } else {
                x = cur;
                xi = i;
            }
            rank -= cur.width;
        }
    }
}

/// Point-in-time view of a summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarySnapshot {
    /// `(quantile, value)` pairs in objective order.
    pub quantiles: Vec<(f64, f64)>,
    pub count: u64,
    pub sum: f64,
}

/// Windowed latency summary. Count and sum are lifetime totals; quantiles
/// cover roughly the last `max_age`.
#[derive(Debug, Clone)]
pub struct LatencySummary {
    objectives: Arc<[Objective]>,
    streams: Vec<QuantileStream>,
    head: usize,
    head_expires: Instant,
    stream_duration: Duration,
    max_age: Duration,
    count: u64,
    sum: f64,
}

impl LatencySummary {
    pub fn new(opts: &SummaryOpts, now: Instant) -> Self {
        let age_buckets = opts.age_buckets.max(1);
        let stream_duration = opts.max_age / age_buckets;
        let streams = (0..age_buckets)
            .map(|_| QuantileStream::new(Arc::clone(&opts.objectives)))
            .collect();

        Self {
            objectives: Arc::clone(&opts.objectives),
            streams,
            head: 0,
            head_expires: now + stream_duration,
            stream_duration,
            max_age: opts.max_age,
            count: 0,
            sum: 0.0,
        }
    }

    pub fn observe(&mut self, value: f64, now: Instant) {
        self.rotate(now);
        for stream in &mut self.streams {
            stream.insert(value);
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn snapshot(&mut self, now: Instant) -> SummarySnapshot {
        self.rotate(now);
        let objectives = Arc::clone(&self.objectives);
        let head = &mut self.streams[self.head];
        let quantiles = objectives
            .iter()
            .map(|o| (o.quantile, head.query(o.quantile)))
            .collect();

        SummarySnapshot {
            quantiles,
            count: self.count,
            sum: self.sum,
        }
    }

    /// Retire every age bucket whose slice of the window ended before `now`.
    fn rotate(&mut self, now: Instant) {
        if now < self.head_expires {
            return;
        }
        if now.duration_since(self.head_expires) >= self.max_age {
            // Idle for longer than the whole window.
            self.streams.iter_mut().for_each(QuantileStream::reset);
            self.head = 0;
            self.head_expires = now + self.stream_duration;
            return;
        }
        while now >= self.head_expires {
            self.streams[self.head].reset();
            self.head = (self.head + 1) % self.streams.len();
            self.head_expires += self.stream_duration;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> QuantileStream {
        QuantileStream::new(Arc::new(DEFAULT_OBJECTIVES))
    }

    /// Deterministic permutation of 1..=n.
    fn shuffled(n: u64) -> Vec<f64> {
        (0..n).map(|i| ((i * 7919) % n + 1) as f64).collect()
    }

    #[test]
    fn test_empty_stream_is_nan() {
        let mut s = stream();
        assert!(s.query(0.5).is_nan());
        assert_eq!(s.count(), 0);
    }

    #[test]
    fn test_single_value() {
        let mut s = stream();
        s.insert(0.042);
        for o in DEFAULT_OBJECTIVES {
            assert_eq!(s.query(o.quantile), 0.042);
        }
    }

    #[test]
    fn test_quantiles_within_error_bounds() {
        let n = 2000;
        let mut s = stream();
        for v in shuffled(n) {
            s.insert(v);
        }
        assert_eq!(s.count(), n);

        for o in DEFAULT_OBJECTIVES {
            let got = s.query(o.quantile);
            let want = o.quantile * n as f64;
            let slack = 2.0 * o.error * n as f64 + 1.0;
            assert!(
                (got - want).abs() <= slack,
                "q={} got={} want={} slack={}",
                o.quantile,
                got,
                want,
                slack
            );
        }
    }

    #[test]
    fn test_compression_keeps_sample_list_small() {
        let mut s = stream();
        for v in shuffled(10_000) {
            s.insert(v);
        }
        s.query(0.5);
        assert!(s.samples.len() < 10_000 / 4, "len={}", s.samples.len());
    }

    #[test]
    fn test_reset_clears_stream() {
        let mut s = stream();
        s.insert(1.0);
        s.reset();
        assert!(s.query(0.99).is_nan());
    }

    #[test]
    fn test_summary_counts_and_sums() {
        let start = Instant::now();
        let mut summary = LatencySummary::new(&SummaryOpts::default(), start);
        summary.observe(0.010, start);
        summary.observe(0.030, start);

        let snap = summary.snapshot(start);
        assert_eq!(snap.count, 2);
        assert!((snap.sum - 0.040).abs() < 1e-12);
        assert_eq!(snap.quantiles.len(), 4);
        assert_eq!(snap.quantiles[0].0, 0.5);
        assert!(!snap.quantiles[0].1.is_nan());
    }

    #[test]
    fn test_window_expires_old_observations() {
        let start = Instant::now();
        let mut summary = LatencySummary::new(&SummaryOpts::default(), start);
        summary.observe(0.5, start);

        // Still inside the window.
        let snap = summary.snapshot(start + Duration::from_secs(60));
        assert_eq!(snap.quantiles[0].1, 0.5);

        // All age buckets rotated past the observation.
        let later = start + DEFAULT_MAX_AGE + Duration::from_secs(1);
        let snap = summary.snapshot(later);
        assert!(snap.quantiles.iter().all(|(_, v)| v.is_nan()));
        // Lifetime totals survive rotation.
        assert_eq!(snap.count, 1);
        assert!((snap.sum - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_window_rotation_is_gradual() {
        let start = Instant::now();
        let mut summary = LatencySummary::new(&SummaryOpts::default(), start);
        summary.observe(1.0, start);
        // Observed one slice later, so it outlives the first value.
        summary.observe(2.0, start + Duration::from_secs(130));

        let snap = summary.snapshot(start + Duration::from_secs(601));
        assert_eq!(snap.quantiles[0].1, 2.0);
    }
}
