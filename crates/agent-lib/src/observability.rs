//! Observability infrastructure for the agent itself
//!
//! Provides:
//! - Prometheus metrics (cycle latency, pods/containers processed, fetch errors)
//! - Structured JSON logging with tracing

use prometheus::{register_histogram, register_int_gauge, Histogram, IntGauge};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for cycle latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    cycle_latency_seconds: Histogram,
    pods_processed: IntGauge,
    containers_processed: IntGauge,
    fetch_errors: IntGauge,
    kubelet_healthy: IntGauge,
    samples_emitted: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "kubestat_agent_cycle_latency_seconds",
                "Time spent running one kubelet/cadvisor polling cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            pods_processed: register_int_gauge!(
                "kubestat_agent_pods_processed",
                "Number of pods processed in the last cycle"
            )
            .expect("Failed to register pods_processed"),

            containers_processed: register_int_gauge!(
                "kubestat_agent_containers_processed",
                "Number of containers processed in the last cycle"
            )
            .expect("Failed to register containers_processed"),

            fetch_errors: register_int_gauge!(
                "kubestat_agent_fetch_errors_total",
                "Total number of failed endpoint fetches"
            )
            .expect("Failed to register fetch_errors"),

            kubelet_healthy: register_int_gauge!(
                "kubestat_agent_kubelet_healthy",
                "Whether the kubelet health endpoint reported ok in the last cycle"
            )
            .expect("Failed to register kubelet_healthy"),

            samples_emitted: register_int_gauge!(
                "kubestat_agent_samples_emitted",
                "Number of telemetry samples emitted in the last cycle"
            )
            .expect("Failed to register samples_emitted"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a cycle latency observation
    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    /// Update last-cycle processing counts
    pub fn set_cycle_counts(&self, pods: i64, containers: i64) {
        self.inner().pods_processed.set(pods);
        self.inner().containers_processed.set(containers);
    }

    /// Add to the fetch error total
    pub fn add_fetch_errors(&self, count: i64) {
        self.inner().fetch_errors.add(count);
    }

    /// Update the kubelet health indicator
    pub fn set_kubelet_healthy(&self, healthy: bool) {
        self.inner().kubelet_healthy.set(if healthy { 1 } else { 0 });
    }

    /// Update the last-cycle sample count
    pub fn set_samples_emitted(&self, count: i64) {
        self.inner().samples_emitted.set(count);
    }
}

/// Structured logger for agent lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            "Kubernetes telemetry agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Kubernetes telemetry agent shutting down"
        );
    }

    /// Log the outcome of one polling cycle
    pub fn log_cycle(
        &self,
        kubelet_healthy: bool,
        pods: usize,
        containers: usize,
        fetch_errors: usize,
        samples: usize,
        duration_secs: f64,
    ) {
        if fetch_errors > 0 {
            warn!(
                event = "check_cycle",
                node = %self.node_name,
                kubelet_healthy = kubelet_healthy,
                pods = pods,
                containers = containers,
                fetch_errors = fetch_errors,
                samples = samples,
                duration_secs = duration_secs,
                "Check cycle completed with fetch errors"
            );
        } else {
            info!(
                event = "check_cycle",
                node = %self.node_name,
                kubelet_healthy = kubelet_healthy,
                pods = pods,
                containers = containers,
                fetch_errors = fetch_errors,
                samples = samples,
                duration_secs = duration_secs,
                "Check cycle completed"
            );
        }
    }
}
