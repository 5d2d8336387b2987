//! Prometheus text exposition for [`ProbeMetrics`].
//!
//! The registry is bridged into the `prometheus` crate as a custom
//! [`Collector`]: every scrape takes a [`ProbeMetrics::snapshot`] and turns
//! it into metric families, which [`TextEncoder`] renders.

use std::collections::HashMap;
use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, MetricFamily, MetricType};
use prometheus::{Encoder, Registry, TextEncoder};

use super::MetricsError;
use super::registry::{MetricsSnapshot, ProbeMetrics, SeriesSnapshot};

/// Label names, in exposition order.
pub const LABEL_NAMES: [&str; 2] = ["host", "ip"];

const PACKETS_SENT: &str = "smokeping_packets_sent";
const PACKETS_RECEIVED: &str = "smokeping_packets_received";
const LATENCY_SUMMARY: &str = "smokeping_response_latency_summary";
const LATENCY_HISTOGRAM: &str = "smokeping_response_duration_seconds";

/// Adapter exposing [`ProbeMetrics`] through the `prometheus` collector API.
pub struct ProbeCollector {
    metrics: Arc<ProbeMetrics>,
    sent_desc: Desc,
    received_desc: Desc,
    summary_desc: Desc,
    histogram_desc: Desc,
}

impl ProbeCollector {
    pub fn new(metrics: Arc<ProbeMetrics>) -> Result<Self, MetricsError> {
        Ok(Self {
            metrics,
            sent_desc: desc(PACKETS_SENT, "counter of all packets being sent out")?,
            received_desc: desc(
                PACKETS_RECEIVED,
                "counter of all responses received (ignoring dups)",
            )?,
            summary_desc: desc(LATENCY_SUMMARY, "Summary for ping response latencies")?,
            histogram_desc: desc(
                LATENCY_HISTOGRAM,
                "A histogram of latencies for ping responses.",
            )?,
        })
    }

    fn families(&self, snapshot: &MetricsSnapshot) -> Vec<MetricFamily> {
        if snapshot.is_empty() {
            return Vec::new();
        }

        let mut sent = family(&self.sent_desc, MetricType::COUNTER);
        let mut received = family(&self.received_desc, MetricType::COUNTER);
        let mut summary = family(&self.summary_desc, MetricType::SUMMARY);
        let mut histogram = family(&self.histogram_desc, MetricType::HISTOGRAM);

        for series in &snapshot.series {
            sent.mut_metric()
                .push(counter_metric(series, series.packets.sent));
            received
                .mut_metric()
                .push(counter_metric(series, series.packets.received));
            summary.mut_metric().push(summary_metric(series));
            histogram.mut_metric().push(histogram_metric(series));
        }

        vec![sent, received, summary, histogram]
    }
}

impl Collector for ProbeCollector {
    fn desc(&self) -> Vec<&Desc> {
        vec![
            &self.sent_desc,
            &self.received_desc,
            &self.summary_desc,
            &self.histogram_desc,
        ]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.families(&self.metrics.snapshot())
    }
}

/// Renders the registry in the Prometheus text format.
pub struct Exposition {
    registry: Registry,
    encoder: TextEncoder,
}

impl std::fmt::Debug for Exposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exposition").finish_non_exhaustive()
    }
}

impl Exposition {
    pub fn new(metrics: Arc<ProbeMetrics>) -> Result<Self, MetricsError> {
        let registry = Registry::new();
        registry.register(Box::new(ProbeCollector::new(metrics)?))?;
        Ok(Self {
            registry,
            encoder: TextEncoder::new(),
        })
    }

    /// `Content-Type` of [`Exposition::render`] output.
    pub fn content_type(&self) -> &str {
        self.encoder.format_type()
    }

    /// Render the current state. An empty registry yields an empty document.
    pub fn render(&self) -> Result<String, MetricsError> {
        let families = self.registry.gather();
        let mut buf = Vec::with_capacity(4 * 1024);
        self.encoder.encode(&families, &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

fn desc(name: &str, help: &str) -> Result<Desc, MetricsError> {
    let labels = LABEL_NAMES.iter().map(|l| l.to_string()).collect();
    Ok(Desc::new(
        name.to_string(),
        help.to_string(),
        labels,
        HashMap::new(),
    )?)
}

fn family(desc: &Desc, kind: MetricType) -> MetricFamily {
    let mut mf = MetricFamily::default();
    mf.set_name(desc.fq_name.clone());
    mf.set_help(desc.help.clone());
    mf.set_field_type(kind);
    mf
}

fn labelled(series: &SeriesSnapshot) -> proto::Metric {
    let mut metric = proto::Metric::default();
    for (name, value) in LABEL_NAMES
        .iter()
        .zip([series.label.host.clone(), series.label.ip.to_string()])
    {
        let mut pair = proto::LabelPair::default();
        pair.set_name(name.to_string());
        pair.set_value(value);
        metric.mut_label().push(pair);
    }
    metric
}

fn counter_metric(series: &SeriesSnapshot, value: u64) -> proto::Metric {
    let mut counter = proto::Counter::default();
    counter.set_value(value as f64);
    let mut metric = labelled(series);
    metric.set_counter(counter);
    metric
}

fn summary_metric(series: &SeriesSnapshot) -> proto::Metric {
    let mut summary = proto::Summary::default();
    summary.set_sample_count(series.summary.count);
    summary.set_sample_sum(series.summary.sum);
    for &(q, value) in &series.summary.quantiles {
        let mut quantile = proto::Quantile::default();
        quantile.set_quantile(q);
        quantile.set_value(value);
        summary.mut_quantile().push(quantile);
    }
    let mut metric = labelled(series);
    metric.set_summary(summary);
    metric
}

fn histogram_metric(series: &SeriesSnapshot) -> proto::Metric {
    let mut histogram = proto::Histogram::default();
    histogram.set_sample_count(series.histogram.count);
    histogram.set_sample_sum(series.histogram.sum);
    for &(upper, cumulative) in &series.histogram.buckets {
        let mut bucket = proto::Bucket::default();
        bucket.set_upper_bound(upper);
        bucket.set_cumulative_count(cumulative);
        histogram.mut_bucket().push(bucket);
    }
    let mut metric = labelled(series);
    metric.set_histogram(histogram);
    metric
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::LabelPair;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn setup() -> (Arc<ProbeMetrics>, Exposition) {
        let metrics = Arc::new(ProbeMetrics::new("0.001,0.01,0.1".parse().unwrap()));
        let exposition = Exposition::new(Arc::clone(&metrics)).unwrap();
        (metrics, exposition)
    }

    fn label() -> LabelPair {
        LabelPair::new("example.org", IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)))
    }

    #[test]
    fn test_empty_registry_renders_empty_document() {
        let (_metrics, exposition) = setup();
        assert_eq!(exposition.render().unwrap(), "");
        assert!(exposition.content_type().starts_with("text/plain"));
    }

    #[test]
    fn test_render_contains_all_families() {
        let (metrics, exposition) = setup();
        let l = label();
        metrics.record_sent(&l);
        metrics.record_received(&l, Duration::from_millis(5));
        metrics.record_sent(&l);

        let out = exposition.render().unwrap();
        assert!(out.contains("# TYPE smokeping_packets_sent counter"));
        assert!(
            out.contains(r#"smokeping_packets_sent{host="example.org",ip="192.0.2.7"} 2"#),
            "{out}"
        );
        assert!(out.contains(r#"smokeping_packets_received{host="example.org",ip="192.0.2.7"} 1"#));
        assert!(out.contains("# TYPE smokeping_response_latency_summary summary"));
        assert!(out.contains(r#"quantile="0.99""#));
        assert!(out.contains(r#"smokeping_response_latency_summary_count{host="example.org",ip="192.0.2.7"} 1"#));
        assert!(out.contains("# TYPE smokeping_response_duration_seconds histogram"));
        assert!(out.contains(
            r#"smokeping_response_duration_seconds_bucket{host="example.org",ip="192.0.2.7",le="0.01"} 1"#
        ));
        assert!(out.contains(
            r#"smokeping_response_duration_seconds_bucket{host="example.org",ip="192.0.2.7",le="+Inf"} 1"#
        ));
    }

    #[test]
    fn test_render_is_stable_without_activity() {
        let (metrics, exposition) = setup();
        let l = label();
        for ms in [3, 7, 40] {
            metrics.record_sent(&l);
            metrics.record_received(&l, Duration::from_millis(ms));
        }
        assert_eq!(exposition.render().unwrap(), exposition.render().unwrap());
    }
}
