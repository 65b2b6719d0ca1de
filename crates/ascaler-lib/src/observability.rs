//! Prometheus metrics for the autoscaler
//!
//! Metrics live in the default registry and are registered once per
//! process; [`ScalerMetrics`] is a cheap handle to them.

use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;

/// Poll cycles are dominated by network calls
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles: IntCounter,
    cycle_failures: IntCounter,
    fetch_errors: IntCounter,
    aggregate_rate: Gauge,
    desired_replicas: IntGauge,
    current_replicas: IntGauge,
    scale_events: IntCounterVec,
    drain_outcomes: IntCounterVec,
    drain_stalls: IntCounter,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "ascaler_cycle_latency_seconds",
                "Time spent in one poll cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles: register_int_counter!("ascaler_cycles_total", "Total number of poll cycles")
                .expect("Failed to register cycles_total"),

            cycle_failures: register_int_counter!(
                "ascaler_cycle_failures_total",
                "Total number of poll cycles that ended in an error"
            )
            .expect("Failed to register cycle_failures_total"),

            fetch_errors: register_int_counter!(
                "ascaler_fetch_errors_total",
                "Total number of management endpoint fetch failures"
            )
            .expect("Failed to register fetch_errors_total"),

            aggregate_rate: register_gauge!(
                "ascaler_aggregate_request_rate",
                "Last computed aggregate request rate (requests/second)"
            )
            .expect("Failed to register aggregate_request_rate"),

            desired_replicas: register_int_gauge!(
                "ascaler_desired_replicas",
                "Replica count computed in the last cycle"
            )
            .expect("Failed to register desired_replicas"),

            current_replicas: register_int_gauge!(
                "ascaler_current_replicas",
                "Replica count last applied to the replica group"
            )
            .expect("Failed to register current_replicas"),

            scale_events: register_int_counter_vec!(
                "ascaler_scale_events_total",
                "Replica changes applied, by direction",
                &["direction"]
            )
            .expect("Failed to register scale_events_total"),

            drain_outcomes: register_int_counter_vec!(
                "ascaler_drain_outcomes_total",
                "Drain attempts on individual pods, by result",
                &["result"]
            )
            .expect("Failed to register drain_outcomes_total"),

            drain_stalls: register_int_counter!(
                "ascaler_drain_stalls_total",
                "Scale-downs that ran out of drain passes"
            )
            .expect("Failed to register drain_stalls_total"),
        }
    }
}

/// Handle to the process-wide autoscaler metrics
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    pub fn observe_cycle(&self, duration_secs: f64, failed: bool) {
        let inner = self.inner();
        inner.cycle_latency_seconds.observe(duration_secs);
        inner.cycles.inc();
        if failed {
            inner.cycle_failures.inc();
        }
    }

    pub fn inc_fetch_errors(&self) {
        self.inner().fetch_errors.inc();
    }

    pub fn set_aggregate_rate(&self, rate: f64) {
        self.inner().aggregate_rate.set(rate);
    }

    pub fn set_desired_replicas(&self, replicas: u32) {
        self.inner().desired_replicas.set(i64::from(replicas));
    }

    pub fn set_current_replicas(&self, replicas: u32) {
        self.inner().current_replicas.set(i64::from(replicas));
    }

    /// `direction` is `up` or `down`
    pub fn inc_scale_event(&self, direction: &str) {
        self.inner()
            .scale_events
            .with_label_values(&[direction])
            .inc();
    }

    /// `result` is `removed` or `resumed`
    pub fn inc_drain_outcome(&self, result: &str) {
        self.inner()
            .drain_outcomes
            .with_label_values(&[result])
            .inc();
    }

    pub fn inc_drain_stalls(&self) {
        self.inner().drain_stalls.inc();
    }
}
