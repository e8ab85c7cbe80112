//! Kubernetes node telemetry agent
//!
//! This binary runs as a DaemonSet on each Kubernetes node, polling the
//! kubelet and cAdvisor endpoints and emitting normalized pod and
//! container telemetry.

use anyhow::{Context, Result};
use kubestat_lib::{
    check::{CheckConfig, KubernetesCheck},
    client::KubeApiClient,
    emit::{LogSink, MetricSink, RecordingSink, SampleKind},
    health::{components, HealthRegistry},
    observability::{AgentMetrics, StructuredLogger},
    ConfigError,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting kubestat-agent");

    let config = config::AgentConfig::load()?;
    config.validate()?;

    // The cluster API client backs both host derivation and the
    // ReplicaSet owner lookup; outside a cluster neither is available.
    let api_client = match KubeApiClient::in_cluster(Duration::from_secs(
        config.connection_timeout_secs,
    )) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!(error = %e, "Cluster API unavailable, owner lookups limited to pod metadata");
            None
        }
    };

    let host = match &config.host {
        Some(host) => host.clone(),
        None => {
            let api = api_client.as_ref().ok_or_else(|| {
                ConfigError::InClusterUnavailable("no API server connection".into())
            })?;
            api.agent_pod_host()
                .await
                .context("Failed to derive the node address")?
        }
    };
    info!(
        host = %host,
        kubelet_port = %config.kubelet_port,
        cadvisor_port = %config.cadvisor_port,
        check_interval_secs = config.check_interval_secs,
        report_container_metrics = config.report_container_metrics,
        use_mount = config.use_mount,
        send_rollup_stats = config.send_rollup_stats,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::KUBELET).await;
    health_registry.register(components::CADVISOR).await;
    health_registry.register(components::CHECK).await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&host);
    logger.log_startup(AGENT_VERSION);

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
    health_registry.set_ready(true).await;

    let _api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let check = KubernetesCheck::new(
        CheckConfig {
            host,
            kubelet_port: config.kubelet_port.clone(),
            cadvisor_port: config.cadvisor_port.clone(),
            connection_timeout: Duration::from_secs(config.connection_timeout_secs),
            report_container_metrics: config.report_container_metrics,
            send_io_stats: config.send_io_stats,
            kubernetes_labels: config.kubernetes_labels.clone(),
            instance_dimensions: Default::default(),
        },
        api_client,
    )?;

    let mut interval = tokio::time::interval(Duration::from_secs(config.check_interval_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_cycle(&check, &health_registry, &metrics, &logger).await;
            }
            _ = tokio::signal::ctrl_c() => {
                logger.log_shutdown("SIGINT received");
                break;
            }
        }
    }

    Ok(())
}

/// Run one check cycle and publish its outcome to the health registry,
/// the self-metrics and the structured log.
async fn run_cycle(
    check: &KubernetesCheck,
    health_registry: &HealthRegistry,
    metrics: &AgentMetrics,
    logger: &StructuredLogger,
) {
    let started = Instant::now();
    let mut recording = RecordingSink::new();
    let report = check.run_cycle(&mut recording).await;
    let duration_secs = started.elapsed().as_secs_f64();

    // Forward every collected sample as a structured log event
    let mut sink = LogSink;
    for sample in &recording.samples {
        match sample.kind {
            SampleKind::Gauge => sink.gauge(&sample.name, sample.value, &sample.dimensions, sample.scope),
            SampleKind::Rate => sink.rate(&sample.name, sample.value, &sample.dimensions, sample.scope),
        }
    }

    metrics.observe_cycle_latency(duration_secs);
    metrics.set_cycle_counts(report.pods_processed as i64, report.containers_processed as i64);
    metrics.add_fetch_errors(report.fetch_errors as i64);
    metrics.set_kubelet_healthy(report.kubelet_healthy);
    metrics.set_samples_emitted(recording.samples.len() as i64);

    if report.kubelet_healthy {
        health_registry.set_healthy(components::KUBELET).await;
    } else {
        health_registry
            .set_unhealthy(components::KUBELET, "Health endpoint did not report ok")
            .await;
    }
    if report.containers_processed > 0 || report.fetch_errors == 0 {
        health_registry.set_healthy(components::CADVISOR).await;
    } else {
        health_registry
            .set_degraded(components::CADVISOR, "Container stats fetch failed")
            .await;
    }
    health_registry.set_healthy(components::CHECK).await;

    logger.log_cycle(
        report.kubelet_healthy,
        report.pods_processed,
        report.containers_processed,
        report.fetch_errors,
        recording.samples.len(),
        duration_secs,
    );
}
