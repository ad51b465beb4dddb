//! Prometheus metrics surface, registered once at construction and
//! exported in text exposition format.
//!
//! Built directly on the `metrics` facade plus
//! `metrics-exporter-prometheus`'s recorder/handle pair. Label values are
//! plain strings rather than an enum-per-label, since the `metrics`
//! macros take `&'static str`/`String` key-value pairs, not typed label
//! sets.

use std::sync::OnceLock;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static RECORDER_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const CACHE_HITS_TOTAL: &str = "cache_hits_total";
const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
const CIRCUIT_BREAKER_STATE: &str = "circuit_breaker_state";
const POOL_ACTIVE_CONNECTIONS: &str = "pool_active_connections";
const POOL_QUEUE_DEPTH: &str = "pool_queue_depth";
const POOL_QUEUE_WAIT_SECONDS: &str = "pool_queue_wait_seconds";

const HTTP_DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
const POOL_WAIT_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0];

/// Gauge value for a circuit breaker's current state, per §4.N.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakerGaugeState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerGaugeState {
    fn value(self) -> f64 {
        match self {
            BreakerGaugeState::Closed => 0.0,
            BreakerGaugeState::Open => 1.0,
            BreakerGaugeState::HalfOpen => 0.5,
        }
    }
}

/// Owns the Prometheus recorder handle and exposes the broker's metric
/// vocabulary as typed methods, plus the generic escape hatches
/// `register_metric`/`increment_counter`/`set_gauge`/`observe_histogram`
/// that §4.N calls for.
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the global recorder and registers every metric named in
    /// §4.N with its describing metadata so `/metrics` output carries
    /// HELP/TYPE lines even before first use.
    ///
    /// `PrometheusBuilder::install_recorder` may only run once per
    /// process — a process-global `OnceLock` does the installation on
    /// the first call and hands back a clone of the same handle on every
    /// later one, so constructing more than one `Metrics` (e.g. once per
    /// test in the same binary) is safe.
    pub fn new() -> Self {
        let handle = RECORDER_HANDLE
            .get_or_init(|| {
                let builder = PrometheusBuilder::new()
                    .set_buckets_for_metric(
                        metrics_exporter_prometheus::Matcher::Full(
                            HTTP_REQUEST_DURATION_SECONDS.to_string(),
                        ),
                        HTTP_DURATION_BUCKETS,
                    )
                    .expect("static bucket list is valid")
                    .set_buckets_for_metric(
                        metrics_exporter_prometheus::Matcher::Full(POOL_QUEUE_WAIT_SECONDS.to_string()),
                        POOL_WAIT_BUCKETS,
                    )
                    .expect("static bucket list is valid");

                builder.install_recorder().expect("prometheus recorder installs once")
            })
            .clone();

        metrics::describe_counter!(CACHE_HITS_TOTAL, "cache lookups that found a live entry");
        metrics::describe_counter!(CACHE_MISSES_TOTAL, "cache lookups that found no live entry");
        metrics::describe_counter!(HTTP_REQUESTS_TOTAL, "completed HTTP requests");
        metrics::describe_histogram!(
            HTTP_REQUEST_DURATION_SECONDS,
            "HTTP request handling latency in seconds"
        );
        metrics::describe_gauge!(CIRCUIT_BREAKER_STATE, "0=closed, 1=open, 0.5=half-open");
        metrics::describe_gauge!(POOL_ACTIVE_CONNECTIONS, "currently connected upstream servers");
        metrics::describe_gauge!(POOL_QUEUE_DEPTH, "calls waiting on a breaker-guarded upstream");
        metrics::describe_histogram!(
            POOL_QUEUE_WAIT_SECONDS,
            "time a call spent waiting before reaching its upstream"
        );

        Self { handle }
    }

    pub fn record_cache_hit(&self, cache_type: &str) {
        counter!(CACHE_HITS_TOTAL, "cache_type" => cache_type.to_string()).increment(1);
    }

    pub fn record_cache_miss(&self, cache_type: &str) {
        counter!(CACHE_MISSES_TOTAL, "cache_type" => cache_type.to_string()).increment(1);
    }

    pub fn record_http_request(&self, method: &str, status: u16, endpoint: &str, duration_secs: f64) {
        counter!(
            HTTP_REQUESTS_TOTAL,
            "method" => method.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        histogram!(
            HTTP_REQUEST_DURATION_SECONDS,
            "method" => method.to_string(),
            "endpoint" => endpoint.to_string()
        )
        .record(duration_secs);
    }

    pub fn set_circuit_breaker_state(&self, server: &str, state: BreakerGaugeState) {
        gauge!(CIRCUIT_BREAKER_STATE, "server" => server.to_string()).set(state.value());
    }

    pub fn set_pool_active_connections(&self, count: f64) {
        gauge!(POOL_ACTIVE_CONNECTIONS).set(count);
    }

    pub fn set_pool_queue_depth(&self, depth: f64) {
        gauge!(POOL_QUEUE_DEPTH).set(depth);
    }

    pub fn observe_pool_queue_wait(&self, seconds: f64) {
        histogram!(POOL_QUEUE_WAIT_SECONDS).record(seconds);
    }

    /// Generic counter increment for callers outside the typed surface
    /// above, per §4.N's extension hook.
    pub fn increment_counter(&self, name: &'static str, labels: &[(&'static str, String)], value: u64) {
        metrics::counter!(name, labels.to_vec()).increment(value);
    }

    pub fn set_gauge(&self, name: &'static str, labels: &[(&'static str, String)], value: f64) {
        metrics::gauge!(name, labels.to_vec()).set(value);
    }

    pub fn observe_histogram(&self, name: &'static str, labels: &[(&'static str, String)], value: f64) {
        metrics::histogram!(name, labels.to_vec()).record(value);
    }

    /// Renders the full text exposition document for `GET /metrics`.
    pub fn export(&self) -> String {
        self.handle.render()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_values_appear_in_exposition_text() {
        let metrics = Metrics::new();
        metrics.record_cache_hit("schema");
        metrics.record_cache_miss("schema");
        metrics.set_circuit_breaker_state("zen", BreakerGaugeState::HalfOpen);
        metrics.set_pool_active_connections(3.0);

        let exposition = metrics.export();
        assert!(exposition.contains("cache_hits_total"));
        assert!(exposition.contains("cache_misses_total"));
        assert!(exposition.contains("circuit_breaker_state"));
        assert!(exposition.contains("pool_active_connections"));
    }

    #[test]
    fn constructing_metrics_twice_does_not_panic() {
        let _first = Metrics::new();
        let _second = Metrics::new();
    }
}
