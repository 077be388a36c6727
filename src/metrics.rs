use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: Outcome,
}

/// Terminal state of a request through the proxy pipeline.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Proxied,
    Redirected,
    InvalidInput,
    Denied,
    DecodeFailure,
    UpstreamFailure,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RuleLabels {
    pub rule: String,
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Central container for every Prometheus metric exposed by the proxy.
pub struct Metrics {
    pub requests_total: Family<OutcomeLabels, Counter>,
    pub rule_matches_total: Family<RuleLabels, Counter>,

    // -- upstream --
    pub upstream_bytes_total: Counter,
    pub upstream_streams_active: Gauge,
    pub upstream_duration_seconds: Histogram,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let requests_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "ghproxy_requests",
            "Proxy requests by terminal outcome",
            requests_total.clone(),
        );

        let rule_matches_total = Family::<RuleLabels, Counter>::default();
        registry.register(
            "ghproxy_rule_matches",
            "Accepted URLs by matching URL rule",
            rule_matches_total.clone(),
        );

        let upstream_bytes_total = Counter::default();
        registry.register(
            "ghproxy_upstream_bytes",
            "Response body bytes streamed from upstream",
            upstream_bytes_total.clone(),
        );

        let upstream_streams_active: Gauge = Gauge::default();
        registry.register(
            "ghproxy_upstream_streams_active",
            "Upstream response bodies currently being streamed",
            upstream_streams_active.clone(),
        );

        let upstream_duration_seconds = Histogram::new(exponential_buckets(0.01, 2.0, 12));
        registry.register(
            "ghproxy_upstream_duration_seconds",
            "Time until upstream response headers arrive",
            upstream_duration_seconds.clone(),
        );

        Self {
            requests_total,
            rule_matches_total,
            upstream_bytes_total,
            upstream_streams_active,
            upstream_duration_seconds,
        }
    }

    pub fn record(&self, outcome: Outcome) {
        self.requests_total
            .get_or_create(&OutcomeLabels { outcome })
            .inc();
    }

    pub fn record_rule(&self, rule: &str) {
        self.rule_matches_total
            .get_or_create(&RuleLabels {
                rule: rule.to_owned(),
            })
            .inc();
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in [`AppState`].
///
/// [`AppState`]: crate::AppState
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all proxy metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }

    /// Render the registry in the OpenMetrics text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_are_counted_per_label() {
        let m = MetricsRegistry::new();
        m.metrics.record(Outcome::Proxied);
        m.metrics.record(Outcome::Proxied);
        m.metrics.record(Outcome::Denied);

        let proxied = m
            .metrics
            .requests_total
            .get_or_create(&OutcomeLabels {
                outcome: Outcome::Proxied,
            })
            .get();
        assert_eq!(proxied, 2);
    }

    #[test]
    fn encoded_text_names_metrics() {
        let m = MetricsRegistry::new();
        m.metrics.record(Outcome::InvalidInput);
        m.metrics.record_rule("gist");
        let text = m.encode().unwrap();
        assert!(text.contains("ghproxy_requests_total{outcome=\"InvalidInput\"} 1"));
        assert!(text.contains("ghproxy_rule_matches_total{rule=\"gist\"} 1"));
        assert!(text.contains("ghproxy_upstream_streams_active 0"));
    }
}
