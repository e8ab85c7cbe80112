//! Cycle orchestration
//!
//! Drives one polling cycle: kubelet health probe, pod list processing,
//! cAdvisor container processing, pod-level flush. Each phase degrades
//! independently; a failed fetch never aborts the whole cycle, and
//! whatever partial data was gathered is still emitted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::aggregate::PodAccumulator;
use crate::client::{KubeApiClient, NodeClient};
use crate::convert::{cpu_string_to_cores, memory_string_to_bytes};
use crate::correlate::correlate_container;
use crate::dimensions::{
    container_dimensions, pod_dimensions, ContainerDimensionMap, DimensionMap, PodDimensionMap,
    PodKey,
};
use crate::emit::{HostScope, MetricSink};
use crate::extract::MetricExtractor;
use crate::models::{phase_code, CadvisorSpec, CadvisorStats, Pod, PodList};
use crate::owners;
use anyhow::Result;

const CADVISOR_SPEC_PATH: &str = "/api/v2.0/spec?type=docker&recursive=true";
const CADVISOR_STATS_PATH: &str = "/api/v2.0/stats?type=docker&recursive=true&count=1";

/// Settings for one check instance.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Node address hosting the kubelet and cAdvisor ports.
    pub host: String,
    pub kubelet_port: String,
    pub cadvisor_port: String,
    pub connection_timeout: Duration,
    /// Emit per-container samples in addition to pod aggregation.
    pub report_container_metrics: bool,
    /// Emit filesystem I/O counters.
    pub send_io_stats: bool,
    /// Pod labels copied onto pod dimensions when present.
    pub kubernetes_labels: Vec<String>,
    /// Base dimensions applied to everything this check emits. The host
    /// identity tag is expected to already be stripped: most samples
    /// here are pod-scoped, not node-scoped.
    pub instance_dimensions: DimensionMap,
}

impl CheckConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            kubelet_port: "10255".into(),
            cadvisor_port: "4194".into(),
            connection_timeout: Duration::from_secs(5),
            report_container_metrics: false,
            send_io_stats: true,
            kubernetes_labels: vec!["app".into()],
            instance_dimensions: DimensionMap::new(),
        }
    }
}

/// Outcome counters for one cycle, fed into agent self-observability.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleReport {
    pub kubelet_healthy: bool,
    pub pods_processed: usize,
    pub containers_processed: usize,
    pub fetch_errors: usize,
}

/// The kubelet/cAdvisor polling check.
pub struct KubernetesCheck {
    config: CheckConfig,
    client: NodeClient,
    api: Option<Arc<KubeApiClient>>,
}

impl KubernetesCheck {
    /// Create a check. `api` enables the ReplicaSet secondary lookup;
    /// without it ReplicaSet owners are reported as-is.
    pub fn new(config: CheckConfig, api: Option<Arc<KubeApiClient>>) -> Result<Self> {
        let client = NodeClient::new(config.connection_timeout)?;
        Ok(Self {
            config,
            client,
            api,
        })
    }

    fn kubelet_url(&self) -> String {
        format!("http://{}:{}", self.config.host, self.config.kubelet_port)
    }

    fn cadvisor_url(&self) -> String {
        format!("http://{}:{}", self.config.host, self.config.cadvisor_port)
    }

    /// Run one polling cycle, emitting every sample into `sink`.
    pub async fn run_cycle(&self, sink: &mut dyn MetricSink) -> CycleReport {
        let mut report = CycleReport::default();
        let kubelet_url = self.kubelet_url();

        report.kubelet_healthy = self.probe_health(&kubelet_url).await;
        sink.gauge(
            "kubelet.health_status",
            if report.kubelet_healthy { 0.0 } else { 1.0 },
            &self.config.instance_dimensions,
            HostScope::Node,
        );

        let mut container_index = ContainerDimensionMap::new();
        let mut pod_index = PodDimensionMap::new();

        match self.client.get_json::<PodList>(&format!("{kubelet_url}/pods")).await {
            Ok(pods) => {
                report.pods_processed = self
                    .process_pods(&pods.items, sink, &mut container_index, &mut pod_index)
                    .await;
            }
            Err(e) => {
                // Container processing still runs; containers degrade to
                // unaffiliated against the empty pod index.
                error!(error = %e, "Error getting pod list from kubelet");
                report.fetch_errors += 1;
            }
        }

        self.process_containers(sink, &container_index, &pod_index, &mut report)
            .await;

        debug!(
            pods = report.pods_processed,
            containers = report.containers_processed,
            fetch_errors = report.fetch_errors,
            "Check cycle complete"
        );
        report
    }

    /// Probe the kubelet health endpoint. Any failure is unhealthy,
    /// never fatal.
    async fn probe_health(&self, kubelet_url: &str) -> bool {
        let url = format!("{kubelet_url}/healthz");
        match self.client.get_text(&url).await {
            Ok(body) => body.lines().any(|line| line.trim() == "ok"),
            Err(e) => {
                warn!(url = %url, error = %e, "Error connecting to the kubelet health endpoint");
                false
            }
        }
    }

    /// Build pod and container dimension records and emit pod-level
    /// status gauges. Returns the number of pods processed.
    async fn process_pods(
        &self,
        pods: &[Pod],
        sink: &mut dyn MetricSink,
        container_index: &mut ContainerDimensionMap,
        pod_index: &mut PodDimensionMap,
    ) -> usize {
        let mut processed = 0;
        for pod in pods {
            let Some(status) = &pod.status else { continue };
            let Some(spec) = &pod.spec else { continue };
            let containers = spec.containers.as_deref().unwrap_or_default();
            let statuses = status.container_statuses.as_deref().unwrap_or_default();
            if containers.is_empty() || statuses.is_empty() {
                // Pod has no containers assigned yet, skip it entirely
                continue;
            }

            let mut pod_dims = pod_dimensions(
                &self.config.instance_dimensions,
                &pod.metadata,
                &self.config.kubernetes_labels,
            );
            let lookup = self.api.as_deref().map(|a| a as &dyn owners::ReplicaSetLookup);
            if let Some(owner) = owners::resolve(&pod.metadata, lookup).await {
                owners::apply_owner_dimension(&mut pod_dims, &owner);
            }

            let pod_key = PodKey::new(&pod.metadata.name, &pod.metadata.namespace);
            pod_index.insert(pod_key, pod_dims.clone());

            let mut pod_restart_count: u64 = 0;
            let mut name_to_id: HashMap<&str, String> = HashMap::new();

            for container_status in statuses {
                let container_dims = container_dimensions(
                    &pod_dims,
                    &container_status.name,
                    &container_status.image,
                );
                let container_id = container_status.runtime_id();
                name_to_id.insert(&container_status.name, container_id.clone());
                container_index.insert(container_id, container_dims.clone());

                if self.config.report_container_metrics {
                    sink.gauge(
                        "container.ready_status",
                        if container_status.ready { 0.0 } else { 1.0 },
                        &container_dims,
                        HostScope::Suppressed,
                    );
                    sink.gauge(
                        "container.restart_count",
                        container_status.restart_count as f64,
                        &container_dims,
                        HostScope::Suppressed,
                    );
                }
                pod_restart_count += container_status.restart_count;
            }

            if self.config.report_container_metrics {
                self.report_container_resources(containers, &name_to_id, container_index, sink);
            }

            sink.gauge(
                "pod.restart_count",
                pod_restart_count as f64,
                &pod_dims,
                HostScope::Suppressed,
            );
            let phase = status.phase.as_deref().unwrap_or("Unknown");
            sink.gauge(
                "pod.phase",
                phase_code(phase) as f64,
                &pod_dims,
                HostScope::Suppressed,
            );
            processed += 1;
        }
        processed
    }

    /// Emit resource limit/request gauges for each spec container whose
    /// status was seen. Missing blocks are logged per item and skipped.
    fn report_container_resources(
        &self,
        containers: &[crate::models::ContainerSpec],
        name_to_id: &HashMap<&str, String>,
        container_index: &ContainerDimensionMap,
        sink: &mut dyn MetricSink,
    ) {
        for container in containers {
            let dims = name_to_id
                .get(container.name.as_str())
                .and_then(|id| container_index.get(id));
            let Some(dims) = dims else {
                warn!(
                    container = %container.name,
                    "No status entry for spec container, skipping resource gauges"
                );
                continue;
            };

            let resources = container.resources.as_ref();
            match resources.and_then(|r| r.limits.as_ref()) {
                Some(limits) => {
                    self.emit_resource_pair(
                        limits,
                        "container.cpu.limit",
                        "container.memory.limit_bytes",
                        dims,
                        sink,
                        &container.name,
                    );
                }
                None => {
                    info!(container = %container.name, "Unable to report container limits");
                }
            }
            match resources.and_then(|r| r.requests.as_ref()) {
                Some(requests) => {
                    self.emit_resource_pair(
                        requests,
                        "container.request.cpu",
                        "container.request.memory_bytes",
                        dims,
                        sink,
                        &container.name,
                    );
                }
                None => {
                    info!(container = %container.name, "Unable to report container requests");
                }
            }
        }
    }

    fn emit_resource_pair(
        &self,
        quantities: &HashMap<String, String>,
        cpu_metric: &str,
        memory_metric: &str,
        dims: &DimensionMap,
        sink: &mut dyn MetricSink,
        container_name: &str,
    ) {
        if let Some(cpu) = quantities.get("cpu") {
            match cpu_string_to_cores(cpu) {
                Ok(cores) => sink.gauge(cpu_metric, cores, dims, HostScope::Suppressed),
                Err(e) => warn!(container = %container_name, error = %e, "Bad cpu quantity"),
            }
        }
        if let Some(memory) = quantities.get("memory") {
            match memory_string_to_bytes(memory) {
                Ok(bytes) => sink.gauge(memory_metric, bytes, dims, HostScope::Suppressed),
                Err(e) => warn!(container = %container_name, error = %e, "Bad memory quantity"),
            }
        }
    }

    /// Fetch the cAdvisor documents and run correlation, extraction and
    /// aggregation. A fetch failure aborts this phase only.
    async fn process_containers(
        &self,
        sink: &mut dyn MetricSink,
        container_index: &ContainerDimensionMap,
        pod_index: &PodDimensionMap,
        report: &mut CycleReport,
    ) {
        let cadvisor_url = self.cadvisor_url();
        let specs: HashMap<String, CadvisorSpec> = match self
            .client
            .get_json(&format!("{cadvisor_url}{CADVISOR_SPEC_PATH}"))
            .await
        {
            Ok(specs) => specs,
            Err(e) => {
                error!(error = %e, "Error getting spec data from cadvisor");
                report.fetch_errors += 1;
                return;
            }
        };
        let stats: HashMap<String, Vec<CadvisorStats>> = match self
            .client
            .get_json(&format!("{cadvisor_url}{CADVISOR_STATS_PATH}"))
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Error getting stats data from cadvisor");
                report.fetch_errors += 1;
                return;
            }
        };

        let extractor = MetricExtractor {
            report_container_metrics: self.config.report_container_metrics,
            send_io_stats: self.config.send_io_stats,
        };
        let mut accumulator = PodAccumulator::new();

        for (key, snapshots) in &stats {
            let Some(spec) = specs.get(key) else {
                warn!(container = %key, "Stats entry without a matching spec, skipping");
                continue;
            };
            // The first snapshot is the most recent sample
            let Some(snapshot) = snapshots.first() else {
                continue;
            };
            let (pod_key, dims) = correlate_container(
                spec,
                &self.config.instance_dimensions,
                container_index,
                pod_index,
            );
            extractor.process_snapshot(snapshot, &dims, pod_key.as_ref(), &mut accumulator, sink);
            report.containers_processed += 1;
        }

        accumulator.flush(pod_index, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{RecordingSink, SampleKind};

    fn test_config(server: &mockito::Server) -> CheckConfig {
        let host_with_port = server.host_with_port();
        let (host, port) = host_with_port.rsplit_once(':').unwrap();
        let mut config = CheckConfig::new(host);
        config.kubelet_port = port.to_string();
        config.cadvisor_port = port.to_string();
        config.connection_timeout = Duration::from_secs(1);
        config
    }

    fn check(server: &mockito::Server) -> KubernetesCheck {
        KubernetesCheck::new(test_config(server), None).unwrap()
    }

    const POD_LIST: &str = r#"{
        "items": [{
            "metadata": {
                "name": "web-1",
                "namespace": "default",
                "labels": {"app": "web"},
                "ownerReferences": [{"kind": "DaemonSet", "name": "web-ds"}]
            },
            "spec": {
                "containers": [
                    {"name": "nginx", "resources": {"limits": {"cpu": "500m", "memory": "256Mi"}}},
                    {"name": "sidecar"}
                ]
            },
            "status": {
                "phase": "Running",
                "containerStatuses": [
                    {"name": "nginx", "image": "nginx:1.25", "containerID": "docker://aaa", "restartCount": 2, "ready": true},
                    {"name": "sidecar", "image": "envoy:1.29", "containerID": "docker://bbb", "restartCount": 3, "ready": false}
                ]
            }
        }]
    }"#;

    const CADVISOR_SPECS: &str = r#"{
        "/docker/aaa": {"aliases": ["nginx-ctr", "aaa"], "image": "nginx:1.25"},
        "/docker/bbb": {"aliases": ["sidecar-ctr", "bbb"], "image": "envoy:1.29"}
    }"#;

    const CADVISOR_STATS: &str = r#"{
        "/docker/aaa": [{
            "has_memory": true,
            "memory": {"rss": 100},
            "has_network": true,
            "network": {"interfaces": [{"name": "eth0", "rx_bytes": 10}]}
        }],
        "/docker/bbb": [{
            "has_memory": true,
            "memory": {"rss": 150},
            "has_network": true,
            "network": {"interfaces": [{"name": "eth0", "rx_bytes": 10}]}
        }]
    }"#;

    #[tokio::test]
    async fn healthy_kubelet_emits_zero() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/healthz")
            .with_body("ok")
            .create_async()
            .await;
        let _pods = server
            .mock("GET", "/pods")
            .with_body(r#"{"items": []}"#)
            .create_async()
            .await;

        let mut sink = RecordingSink::new();
        let report = check(&server).run_cycle(&mut sink).await;

        assert!(report.kubelet_healthy);
        assert_eq!(sink.value("kubelet.health_status").unwrap(), 0.0);
    }

    #[tokio::test]
    async fn unhealthy_body_and_unreachable_kubelet_emit_one() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/healthz")
            .with_body("degraded")
            .create_async()
            .await;

        let mut sink = RecordingSink::new();
        let report = check(&server).run_cycle(&mut sink).await;
        assert!(!report.kubelet_healthy);
        assert_eq!(sink.value("kubelet.health_status").unwrap(), 1.0);

        // Unreachable endpoint behaves the same
        let mut config = test_config(&server);
        config.kubelet_port = "1".into();
        let unreachable = KubernetesCheck::new(config, None).unwrap();
        let mut sink = RecordingSink::new();
        let report = unreachable.run_cycle(&mut sink).await;
        assert!(!report.kubelet_healthy);
        assert_eq!(sink.value("kubelet.health_status").unwrap(), 1.0);
    }

    #[tokio::test]
    async fn pod_gauges_sum_restarts_and_encode_phase() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/healthz")
            .with_body("ok")
            .create_async()
            .await;
        let _pods = server
            .mock("GET", "/pods")
            .with_body(POD_LIST)
            .create_async()
            .await;

        let mut sink = RecordingSink::new();
        let report = check(&server).run_cycle(&mut sink).await;

        assert_eq!(report.pods_processed, 1);
        let restarts = sink.named("pod.restart_count");
        assert_eq!(restarts.len(), 1);
        assert_eq!(restarts[0].value, 5.0);
        assert_eq!(restarts[0].scope, HostScope::Suppressed);
        assert_eq!(restarts[0].dimensions.get("app").unwrap(), "web");
        assert_eq!(restarts[0].dimensions.get("daemon_set").unwrap(), "web-ds");
        assert_eq!(sink.value("pod.phase").unwrap(), 1.0);
    }

    #[tokio::test]
    async fn container_gauges_require_the_flag() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/healthz")
            .with_body("ok")
            .create_async()
            .await;
        let _pods = server
            .mock("GET", "/pods")
            .with_body(POD_LIST)
            .create_async()
            .await;

        let mut sink = RecordingSink::new();
        check(&server).run_cycle(&mut sink).await;
        assert!(sink.named("container.ready_status").is_empty());
        assert!(sink.named("container.cpu.limit").is_empty());

        let mut config = test_config(&server);
        config.report_container_metrics = true;
        let check = KubernetesCheck::new(config, None).unwrap();
        let mut sink = RecordingSink::new();
        check.run_cycle(&mut sink).await;

        assert_eq!(sink.named("container.ready_status").len(), 2);
        assert_eq!(sink.named("container.restart_count").len(), 2);
        // 500m -> 0.5 cores, 256Mi -> bytes
        assert_eq!(sink.value("container.cpu.limit").unwrap(), 0.5);
        assert_eq!(
            sink.value("container.memory.limit_bytes").unwrap(),
            256.0 * 1024.0 * 1024.0
        );
        // The sidecar has no resources block: logged, not fatal
        assert_eq!(sink.named("container.cpu.limit").len(), 1);
    }

    #[tokio::test]
    async fn full_cycle_aggregates_container_metrics_into_pods() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/healthz")
            .with_body("ok")
            .create_async()
            .await;
        let _pods = server
            .mock("GET", "/pods")
            .with_body(POD_LIST)
            .create_async()
            .await;
        let _spec = server
            .mock("GET", CADVISOR_SPEC_PATH)
            .with_body(CADVISOR_SPECS)
            .create_async()
            .await;
        let _stats = server
            .mock("GET", CADVISOR_STATS_PATH)
            .with_body(CADVISOR_STATS)
            .create_async()
            .await;

        let mut sink = RecordingSink::new();
        let report = check(&server).run_cycle(&mut sink).await;

        assert_eq!(report.containers_processed, 2);
        assert_eq!(report.fetch_errors, 0);
        // Two containers contributed rss 100 + 150
        assert_eq!(sink.value("pod.mem.rss_bytes").unwrap(), 250.0);
        // Both reported rx_bytes=10 on eth0
        let samples = sink.named("pod.net.in_bytes");
        let net = samples
            .iter()
            .find(|s| s.kind == SampleKind::Gauge)
            .unwrap();
        assert_eq!(net.value, 20.0);
        assert_eq!(net.dimensions.get("interface").unwrap(), "eth0");
    }

    #[tokio::test]
    async fn cadvisor_failure_still_emits_pod_gauges() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/healthz")
            .with_body("ok")
            .create_async()
            .await;
        let _pods = server
            .mock("GET", "/pods")
            .with_body(POD_LIST)
            .create_async()
            .await;
        let _spec = server
            .mock("GET", CADVISOR_SPEC_PATH)
            .with_status(500)
            .create_async()
            .await;

        let mut sink = RecordingSink::new();
        let report = check(&server).run_cycle(&mut sink).await;

        assert_eq!(report.fetch_errors, 1);
        assert_eq!(report.containers_processed, 0);
        // Pod-derived gauges from the kubelet phase survive
        assert_eq!(sink.value("pod.restart_count").unwrap(), 5.0);
        assert!(sink.named("pod.mem.rss_bytes").is_empty());
    }

    #[tokio::test]
    async fn pod_list_failure_degrades_to_unaffiliated_containers() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/healthz")
            .with_body("ok")
            .create_async()
            .await;
        let _pods = server
            .mock("GET", "/pods")
            .with_status(500)
            .create_async()
            .await;
        let _spec = server
            .mock("GET", CADVISOR_SPEC_PATH)
            .with_body(CADVISOR_SPECS)
            .create_async()
            .await;
        let _stats = server
            .mock("GET", CADVISOR_STATS_PATH)
            .with_body(CADVISOR_STATS)
            .create_async()
            .await;

        let mut config = test_config(&server);
        config.report_container_metrics = true;
        let check = KubernetesCheck::new(config, None).unwrap();
        let mut sink = RecordingSink::new();
        let report = check.run_cycle(&mut sink).await;

        assert_eq!(report.fetch_errors, 1);
        assert_eq!(report.pods_processed, 0);
        assert_eq!(report.containers_processed, 2);
        // Container samples exist but nothing aggregated to pods
        assert!(!sink.named("container.mem.rss_bytes").is_empty());
        assert!(sink.named("pod.mem.rss_bytes").is_empty());
    }

    #[tokio::test]
    async fn pods_without_statuses_are_skipped() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/healthz")
            .with_body("ok")
            .create_async()
            .await;
        let _pods = server
            .mock("GET", "/pods")
            .with_body(
                r#"{"items": [{
                    "metadata": {"name": "pending-1", "namespace": "default"},
                    "spec": {"containers": [{"name": "c"}]},
                    "status": {"phase": "Pending"}
                }]}"#,
            )
            .create_async()
            .await;

        let mut sink = RecordingSink::new();
        let report = check(&server).run_cycle(&mut sink).await;
        assert_eq!(report.pods_processed, 0);
        assert!(sink.named("pod.phase").is_empty());
    }
}
