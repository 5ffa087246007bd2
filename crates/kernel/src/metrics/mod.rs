//! Prometheus metrics collection.
//!
//! Provides filter metrics in Prometheus format.

use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets, linear_buckets};
use prometheus_client::registry::Registry;

/// Filter outcome labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

/// Cache domain labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DomainLabels {
    pub domain: String,
}

/// Application metrics.
pub struct Metrics {
    registry: Registry,

    /// Filter passes by outcome.
    pub filter_requests: Family<OutcomeLabels, Counter>,

    /// Time spent in one filter pass.
    pub filter_duration_seconds: Histogram,

    /// Fraction of the roster kept by filtered passes.
    pub kept_ratio: Histogram,

    /// Cache hits by domain.
    pub cache_hits: Family<DomainLabels, Counter>,

    /// Cache misses by domain.
    pub cache_misses: Family<DomainLabels, Counter>,

    /// Dependency graph rebuilds.
    pub graph_rebuilds: Counter,
}

impl Metrics {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let filter_requests = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "sieve_filter_requests",
            "Filter passes by outcome",
            filter_requests.clone(),
        );

        let filter_duration_seconds = Histogram::new(exponential_buckets(0.00005, 2.0, 14));
        registry.register(
            "sieve_filter_duration_seconds",
            "Filter pass duration in seconds",
            filter_duration_seconds.clone(),
        );

        let kept_ratio = Histogram::new(linear_buckets(0.1, 0.1, 10));
        registry.register(
            "sieve_kept_ratio",
            "Fraction of active plugins kept by a filtered pass",
            kept_ratio.clone(),
        );

        let cache_hits = Family::<DomainLabels, Counter>::default();
        registry.register("sieve_cache_hits", "Cache hit count", cache_hits.clone());

        let cache_misses = Family::<DomainLabels, Counter>::default();
        registry.register(
            "sieve_cache_misses",
            "Cache miss count",
            cache_misses.clone(),
        );

        let graph_rebuilds = Counter::default();
        registry.register(
            "sieve_graph_rebuilds",
            "Dependency graph rebuilds",
            graph_rebuilds.clone(),
        );

        Self {
            registry,
            filter_requests,
            filter_duration_seconds,
            kept_ratio,
            cache_hits,
            cache_misses,
            graph_rebuilds,
        }
    }

    /// Record one filter pass.
    pub fn record_filter(&self, outcome: &str, duration_secs: f64, kept: usize, active: usize) {
        let labels = OutcomeLabels {
            outcome: outcome.to_string(),
        };
        self.filter_requests.get_or_create(&labels).inc();
        self.filter_duration_seconds.observe(duration_secs);

        if outcome == "filtered" && active > 0 {
            self.kept_ratio.observe(kept as f64 / active as f64);
        }
    }

    /// Record a cache lookup.
    pub fn record_cache(&self, domain: &str, hit: bool) {
        let labels = DomainLabels {
            domain: domain.to_string(),
        };
        let family = if hit {
            &self.cache_hits
        } else {
            &self.cache_misses
        };
        family.get_or_create(&labels).inc();
    }

    /// Record a dependency graph rebuild.
    pub fn record_graph_rebuild(&self) {
        self.graph_rebuilds.inc();
    }

    /// Encode metrics in Prometheus text format.
    ///
    /// # Panics
    ///
    /// Panics if Prometheus metric encoding to a `String` buffer fails.
    /// The `fmt::Write` impl for `String` is infallible, and all metric
    /// labels use derived `EncodeLabelSet` impls that do not produce
    /// `fmt::Error`.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        // Prometheus encoding to String buffer is infallible
        #[allow(clippy::expect_used)]
        encode(&mut buffer, &self.registry).expect("encoding metrics");
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let output = Metrics::new().encode();
        assert!(output.contains("sieve_filter_duration_seconds"));
        assert!(output.contains("sieve_graph_rebuilds"));
    }

    #[test]
    fn test_record_filter() {
        let metrics = Metrics::new();
        metrics.record_filter("filtered", 0.001, 3, 10);
        metrics.record_filter("below_minimum", 0.001, 10, 10);

        let output = metrics.encode();
        assert!(output.contains("outcome=\"filtered\""));
        assert!(output.contains("outcome=\"below_minimum\""));
    }

    #[test]
    fn test_record_cache() {
        let metrics = Metrics::new();
        metrics.record_cache("url", true);
        metrics.record_cache("content", false);

        let output = metrics.encode();
        assert!(output.contains("domain=\"url\""));
        assert!(output.contains("domain=\"content\""));
    }
}
