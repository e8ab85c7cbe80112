//! Upstream payload schemas
//!
//! Typed projections of the kubelet `/pods` document and the cAdvisor
//! v2.0 spec/stats documents. Anything either API may omit is an
//! `Option`; a missing field is an absent value, never a decode error.

use serde::Deserialize;
use std::collections::HashMap;

// --- kubelet ---------------------------------------------------------------

/// `GET /pods` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pod {
    pub metadata: PodMetadata,
    #[serde(default)]
    pub spec: Option<PodSpec>,
    #[serde(default)]
    pub status: Option<PodStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMetadata {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default)]
    pub owner_references: Option<Vec<OwnerReference>>,
    #[serde(default)]
    pub annotations: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Option<Vec<ContainerSpec>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub limits: Option<HashMap<String, String>>,
    #[serde(default)]
    pub requests: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub container_statuses: Option<Vec<ContainerStatus>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    #[serde(default)]
    pub image: String,
    /// Composite "runtime://id" string; may be absent while the
    /// container is still being created.
    #[serde(default, rename = "containerID")]
    pub container_id: Option<String>,
    #[serde(default)]
    pub restart_count: u64,
    #[serde(default)]
    pub ready: bool,
}

impl ContainerStatus {
    /// Runtime container id with the "runtime://" scheme stripped.
    pub fn runtime_id(&self) -> String {
        self.container_id
            .as_deref()
            .unwrap_or("")
            .rsplit("//")
            .next()
            .unwrap_or("")
            .to_string()
    }
}

/// Pod phase enumeration emitted as `pod.phase`.
pub fn phase_code(phase: &str) -> u8 {
    match phase {
        "Succeeded" => 0,
        "Running" => 1,
        "Pending" => 2,
        "Failed" => 3,
        _ => 4, // Unknown, including unrecognized phases
    }
}

// --- replicaset (in-cluster secondary lookup) ------------------------------

/// Minimal projection of a ReplicaSet object: only its annotations are
/// needed to detect Deployment management.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaSet {
    pub metadata: ReplicaSetMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaSetMetadata {
    #[serde(default)]
    pub annotations: Option<HashMap<String, String>>,
}

// --- in-cluster pod lookup (derive_host) -----------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ApiPod {
    #[serde(default)]
    pub status: Option<ApiPodStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPodStatus {
    #[serde(default)]
    pub host_ip: Option<String>,
}

// --- cAdvisor --------------------------------------------------------------

/// One entry of `GET /api/v2.0/spec?type=docker&recursive=true`.
#[derive(Debug, Clone, Deserialize)]
pub struct CadvisorSpec {
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

/// One snapshot of `GET /api/v2.0/stats?...&count=1`.
#[derive(Debug, Clone, Deserialize)]
pub struct CadvisorStats {
    #[serde(default)]
    pub has_cpu: bool,
    #[serde(default)]
    pub cpu: Option<CpuStats>,
    #[serde(default)]
    pub has_memory: bool,
    #[serde(default)]
    pub memory: Option<MemoryStats>,
    #[serde(default)]
    pub has_filesystem: bool,
    #[serde(default)]
    pub filesystem: Option<Vec<FilesystemStats>>,
    #[serde(default)]
    pub has_network: bool,
    #[serde(default)]
    pub network: Option<NetworkStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub usage: Option<CpuUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub system: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub user: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub rss: Option<u64>,
    #[serde(default)]
    pub swap: Option<u64>,
    #[serde(default)]
    pub cache: Option<u64>,
    #[serde(default)]
    pub usage: Option<u64>,
    #[serde(default)]
    pub failcnt: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesystemStats {
    pub device: String,
    #[serde(default)]
    pub capacity: Option<u64>,
    #[serde(default)]
    pub usage: Option<u64>,
    #[serde(default)]
    pub writes_completed: Option<u64>,
    #[serde(default)]
    pub reads_completed: Option<u64>,
    #[serde(default)]
    pub io_in_progress: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkStats {
    #[serde(default)]
    pub interfaces: Vec<InterfaceStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceStats {
    pub name: String,
    #[serde(default)]
    pub rx_bytes: Option<u64>,
    #[serde(default)]
    pub tx_bytes: Option<u64>,
    #[serde(default)]
    pub rx_packets: Option<u64>,
    #[serde(default)]
    pub tx_packets: Option<u64>,
    #[serde(default)]
    pub rx_dropped: Option<u64>,
    #[serde(default)]
    pub tx_dropped: Option<u64>,
    #[serde(default)]
    pub rx_errors: Option<u64>,
    #[serde(default)]
    pub tx_errors: Option<u64>,
}
