//! Metrics collection for observability
//!
//! Prometheus metrics for the ballot service, registered on a registry owned
//! by the service instance (several services may live in one process).
//!
//! # Metrics
//!
//! - `ballot_requests_total{function, outcome}` - Requests by function and outcome
//! - `ballot_votes_total` - Accepted votes
//! - `ballot_tally_duration_seconds` - Histogram of tally latencies
//! - `ballot_candidate_cache_total{result}` - Candidate cache hits and misses

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Requests by function and outcome
    pub requests_total: IntCounterVec,

    /// Accepted votes
    pub votes_total: IntCounter,

    /// Tally duration histogram
    pub tally_duration: Histogram,

    /// Candidate cache lookups by result
    pub cache_lookups: IntCounterVec,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = IntCounterVec::new(
            Opts::new("ballot_requests_total", "Requests by function and outcome"),
            &["function", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let votes_total = IntCounter::new("ballot_votes_total", "Accepted votes")?;
        registry.register(Box::new(votes_total.clone()))?;

        let tally_duration = Histogram::with_opts(
            HistogramOpts::new("ballot_tally_duration_seconds", "Histogram of tally latencies")
                .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(tally_duration.clone()))?;

        let cache_lookups = IntCounterVec::new(
            Opts::new("ballot_candidate_cache_total", "Candidate cache lookups"),
            &["result"],
        )?;
        registry.register(Box::new(cache_lookups.clone()))?;

        Ok(Self {
            requests_total,
            votes_total,
            tally_duration,
            cache_lookups,
            registry,
        })
    }

    /// Record one request outcome (`ok` or an error kind label)
    pub fn record_request(&self, function: &str, outcome: &str) {
        self.requests_total
            .with_label_values(&[function, outcome])
            .inc();
    }

    /// Record an accepted vote
    pub fn record_vote(&self) {
        self.votes_total.inc();
    }

    /// Record tally duration
    pub fn record_tally_duration(&self, duration_seconds: f64) {
        self.tally_duration.observe(duration_seconds);
    }

    /// Record a candidate cache lookup
    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[result]).inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("votes_total", &self.votes_total.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.votes_total.get(), 0);

        // Independent registries do not collide
        let other = Metrics::new().unwrap();
        other.record_vote();
        assert_eq!(metrics.votes_total.get(), 0);
    }

    #[test]
    fn test_record_request() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("vote", "ok");
        metrics.record_request("vote", "ok");
        metrics.record_request("vote", "conflict");

        assert_eq!(
            metrics
                .requests_total
                .with_label_values(&["vote", "ok"])
                .get(),
            2
        );
        assert_eq!(
            metrics
                .requests_total
                .with_label_values(&["vote", "conflict"])
                .get(),
            1
        );
    }

    #[test]
    fn test_record_cache_lookup() {
        let metrics = Metrics::new().unwrap();
        metrics.record_cache_lookup(true);
        metrics.record_cache_lookup(false);
        metrics.record_cache_lookup(false);
        assert_eq!(metrics.cache_lookups.with_label_values(&["miss"]).get(), 2);
    }

    #[test]
    fn test_gather() {
        let metrics = Metrics::new().unwrap();
        metrics.record_vote();
        metrics.record_tally_duration(0.002);
        let families = metrics.registry().gather();
        assert!(families.iter().any(|f| f.get_name() == "ballot_votes_total"));
    }
}
