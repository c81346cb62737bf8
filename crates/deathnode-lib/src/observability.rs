//! Prometheus metrics for the control loop

use std::sync::OnceLock;

use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter, IntCounterVec,
    IntGauge,
};

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DeathnodeMetricsInner> = OnceLock::new();

struct DeathnodeMetricsInner {
    ticks_total: IntCounter,
    instances_marked_total: IntCounter,
    lifecycle_completions_total: IntCounter,
    notebook_attempt_errors_total: IntCounter,
    monitor_refresh_errors_total: IntCounterVec,
    undesired_instances: IntGauge,
    marked_instances: IntGauge,
}

impl DeathnodeMetricsInner {
    fn new() -> Self {
        Self {
            ticks_total: register_int_counter!(
                "deathnode_ticks_total",
                "Control ticks executed"
            )
            .expect("Failed to register ticks_total"),

            instances_marked_total: register_int_counter!(
                "deathnode_instances_marked_total",
                "Instances tagged with the death mark"
            )
            .expect("Failed to register instances_marked_total"),

            lifecycle_completions_total: register_int_counter!(
                "deathnode_lifecycle_completions_total",
                "Lifecycle actions completed, releasing instances for termination"
            )
            .expect("Failed to register lifecycle_completions_total"),

            notebook_attempt_errors_total: register_int_counter!(
                "deathnode_notebook_attempt_errors_total",
                "Per-instance termination attempts that failed"
            )
            .expect("Failed to register notebook_attempt_errors_total"),

            monitor_refresh_errors_total: register_int_counter_vec!(
                "deathnode_monitor_refresh_errors_total",
                "Failed monitor refreshes by backend",
                &["backend"]
            )
            .expect("Failed to register monitor_refresh_errors_total"),

            undesired_instances: register_int_gauge!(
                "deathnode_undesired_instances",
                "Instances over desired capacity across managed groups"
            )
            .expect("Failed to register undesired_instances"),

            marked_instances: register_int_gauge!(
                "deathnode_marked_instances",
                "Instances currently carrying the death mark"
            )
            .expect("Failed to register marked_instances"),
        }
    }
}

/// Lightweight handle to the global metrics; clones share the instance.
#[derive(Clone, Default)]
pub struct DeathnodeMetrics {
    _private: (),
}

impl DeathnodeMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DeathnodeMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &'static DeathnodeMetricsInner {
        GLOBAL_METRICS.get_or_init(DeathnodeMetricsInner::new)
    }

    pub fn record_tick(&self) {
        self.inner().ticks_total.inc();
    }

    pub fn record_instance_marked(&self) {
        self.inner().instances_marked_total.inc();
    }

    pub fn record_lifecycle_completion(&self) {
        self.inner().lifecycle_completions_total.inc();
    }

    pub fn record_notebook_attempt_error(&self) {
        self.inner().notebook_attempt_errors_total.inc();
    }

    pub fn record_refresh_error(&self, backend: &str) {
        self.inner()
            .monitor_refresh_errors_total
            .with_label_values(&[backend])
            .inc();
    }

    pub fn set_undesired_instances(&self, count: i64) {
        self.inner().undesired_instances.set(count);
    }

    pub fn set_marked_instances(&self, count: i64) {
        self.inner().marked_instances.set(count);
    }
}
