//! Aggregate metrics
//!
//! Process-wide latency and packet-count aggregates keyed by
//! `(host, ip)` label pairs, plus their Prometheus text rendering.
//!
//! # Components
//!
//! - [`ProbeMetrics`]: the aggregate registry written by probe schedulers
//! - [`LatencySummary`]: windowed streaming quantile estimator
//! - [`LatencyHistogram`] / [`Buckets`]: fixed-boundary cumulative histogram
//! - [`Exposition`]: renders the registry for a scrape request

mod exposition;
mod histogram;
mod registry;
mod summary;

use thiserror::Error;

pub use exposition::{Exposition, LABEL_NAMES, ProbeCollector};
pub use histogram::{BucketError, Buckets, HistogramSnapshot, LatencyHistogram};
pub use registry::{LabelPair, MetricsSnapshot, PacketCounts, ProbeMetrics, SeriesSnapshot};
pub use summary::{
    DEFAULT_AGE_BUCKETS, DEFAULT_MAX_AGE, DEFAULT_OBJECTIVES, LatencySummary, Objective,
    QuantileStream, SummaryOpts, SummarySnapshot,
};

/// Errors raised while registering or rendering metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The `prometheus` crate rejected a descriptor or failed to encode.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Encoded output was not valid UTF-8.
    #[error("exposition is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
