//! Fixed-bucket latency histogram.

use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while parsing histogram bucket boundaries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BucketError {
    /// The bucket list contained no boundaries.
    #[error("bucket list is empty")]
    Empty,

    /// A boundary could not be parsed as a float.
    #[error("invalid float in bucket: '{0}'")]
    InvalidFloat(String),

    /// A boundary was NaN.
    #[error("bucket boundary at position {0} is NaN")]
    NotANumber(usize),

    /// Boundaries were not strictly increasing.
    #[error("bucket boundaries must be strictly increasing: {prev} is followed by {next}")]
    NotIncreasing { prev: f64, next: f64 },
}

/// Ordered, strictly increasing histogram upper bounds in seconds.
///
/// The implicit `+Inf` bucket is never stored; a trailing `+Inf` in the
/// input is accepted and dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Buckets(Arc<[f64]>);

impl Buckets {
    /// Build a bucket set from explicit upper bounds.
    pub fn new(mut bounds: Vec<f64>) -> Result<Self, BucketError> {
        if bounds.last().is_some_and(|b| *b == f64::INFINITY) {
            bounds.pop();
        }
        if bounds.is_empty() {
            return Err(BucketError::Empty);
        }
        for (i, b) in bounds.iter().enumerate() {
            if b.is_nan() {
                return Err(BucketError::NotANumber(i));
            }
        }
        for pair in bounds.windows(2) {
            if pair[0] >= pair[1] {
                return Err(BucketError::NotIncreasing {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        Ok(Self(bounds.into()))
    }

    /// Exponentially growing buckets: `start, start*factor, ...` (`count` items).
    pub fn exponential(start: f64, factor: f64, count: usize) -> Result<Self, BucketError> {
        let bounds = std::iter::successors(Some(start), |b| Some(b * factor))
            .take(count)
            .collect();
        Self::new(bounds)
    }

    /// Upper bounds, ascending.
    pub fn bounds(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for Buckets {
    type Err = BucketError;

    /// Parse a comma-separated list such as `"0.1,0.2,0.5"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bounds = s
            .split(',')
            .map(str::trim)
            .map(|item| {
                item.parse::<f64>()
                    .map_err(|_| BucketError::InvalidFloat(item.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(bounds)
    }
}

/// Point-in-time view of a histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// `(upper_bound, cumulative_count)` pairs, ascending.
    pub buckets: Vec<(f64, u64)>,
    pub count: u64,
    pub sum: f64,
}

/// Histogram with boundaries fixed at construction.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    buckets: Buckets,
    /// Per-bucket (non-cumulative) counts; observations above the last
    /// bound only show up in `count`.
    counts: Vec<u64>,
    count: u64,
    sum: f64,
}

impl LatencyHistogram {
    pub fn new(buckets: Buckets) -> Self {
        let counts = vec![0; buckets.len()];
        Self {
            buckets,
            counts,
            count: 0,
            sum: 0.0,
        }
    }

    /// Record one observation.
    pub fn observe(&mut self, value: f64) {
        let idx = self.buckets.bounds().partition_point(|b| *b < value);
        if let Some(slot) = self.counts.get_mut(idx) {
            *slot += 1;
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let buckets = self
            .buckets
            .bounds()
            .iter()
            .zip(&self.counts)
            .scan(0u64, |acc, (bound, n)| {
                *acc += n;
                Some((*bound, *acc))
            })
            .collect();

        HistogramSnapshot {
            buckets,
            count: self.count,
            sum: self.sum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_buckets() {
        let buckets: Buckets = "0.1, 0.2,0.5".parse().unwrap();
        assert_eq!(buckets.bounds(), &[0.1, 0.2, 0.5]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = "0.1,abc,0.3".parse::<Buckets>().unwrap_err();
        assert_eq!(err, BucketError::InvalidFloat("abc".to_string()));
    }

    #[test]
    fn test_parse_rejects_empty_items() {
        assert!("".parse::<Buckets>().is_err());
        assert!("0.1,,0.3".parse::<Buckets>().is_err());
    }

    #[test]
    fn test_parse_rejects_unordered() {
        let err = "0.1,0.3,0.2".parse::<Buckets>().unwrap_err();
        assert!(matches!(err, BucketError::NotIncreasing { .. }));
        assert!("0.1,0.1".parse::<Buckets>().is_err());
    }

    #[test]
    fn test_trailing_inf_is_dropped() {
        let buckets: Buckets = "0.1,0.2,+Inf".parse().unwrap();
        assert_eq!(buckets.len(), 2);
        assert!(matches!("+Inf".parse::<Buckets>(), Err(BucketError::Empty)));
    }

    #[test]
    fn test_exponential_buckets() {
        let buckets = Buckets::exponential(0.00005, 2.0, 20).unwrap();
        assert_eq!(buckets.len(), 20);
        assert_eq!(buckets.bounds()[0], 0.00005);
        assert!((buckets.bounds()[19] - 26.2144).abs() < 1e-9);
    }

    #[test]
    fn test_cumulative_bucket_law() {
        let buckets: Buckets = "0.1,0.2,0.3".parse().unwrap();
        let mut histo = LatencyHistogram::new(buckets);

        histo.observe(0.15);
        let snap = histo.snapshot();
        assert_eq!(snap.buckets, vec![(0.1, 0), (0.2, 1), (0.3, 1)]);

        // A value on a boundary lands in that bucket.
        histo.observe(0.1);
        let snap = histo.snapshot();
        assert_eq!(snap.buckets, vec![(0.1, 1), (0.2, 2), (0.3, 2)]);

        // Above the last bound: only the implicit +Inf bucket (count) moves.
        histo.observe(5.0);
        let snap = histo.snapshot();
        assert_eq!(snap.buckets, vec![(0.1, 1), (0.2, 2), (0.3, 2)]);
        assert_eq!(snap.count, 3);
        assert!((snap.sum - 5.25).abs() < 1e-9);
    }
}
