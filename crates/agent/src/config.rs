//! Agent configuration

use anyhow::Result;
use kubestat_lib::ConfigError;
use serde::Deserialize;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node address hosting the kubelet and cAdvisor ports. When unset,
    /// `derive_host` must be enabled.
    #[serde(default)]
    pub host: Option<String>,

    /// Derive the node address from this agent's own pod via the
    /// cluster API server
    #[serde(default)]
    pub derive_host: bool,

    /// Kubelet read-only port
    #[serde(default = "default_kubelet_port")]
    pub kubelet_port: String,

    /// cAdvisor port
    #[serde(default = "default_cadvisor_port")]
    pub cadvisor_port: String,

    /// Endpoint fetch timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Emit per-container samples in addition to pod aggregation
    #[serde(default)]
    pub report_container_metrics: bool,

    /// Emit filesystem I/O counters
    #[serde(default = "default_send_io_stats")]
    pub send_io_stats: bool,

    /// Pod labels copied onto pod dimensions when present
    #[serde(default = "default_kubernetes_labels")]
    pub kubernetes_labels: Vec<String>,

    /// Polling interval in seconds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Report filesystem stats per mount point rather than per device
    #[serde(default)]
    pub use_mount: bool,

    /// Emit rollup stats from the node-level collectors
    #[serde(default)]
    pub send_rollup_stats: bool,
}

fn default_kubelet_port() -> String {
    "10255".to_string()
}

fn default_cadvisor_port() -> String {
    "4194".to_string()
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_send_io_stats() -> bool {
    true
}

fn default_kubernetes_labels() -> Vec<String> {
    vec!["app".to_string()]
}

fn default_check_interval() -> u64 {
    30
}

fn default_api_port() -> u16 {
    8080
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: None,
            derive_host: false,
            kubelet_port: default_kubelet_port(),
            cadvisor_port: default_cadvisor_port(),
            connection_timeout_secs: default_connection_timeout(),
            report_container_metrics: false,
            send_io_stats: default_send_io_stats(),
            kubernetes_labels: default_kubernetes_labels(),
            check_interval_secs: default_check_interval(),
            api_port: default_api_port(),
            use_mount: false,
            send_rollup_stats: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("KUBESTAT")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("kubernetes_labels"),
            )
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }

    /// Reject configurations with no way to determine the node address.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_none() && !self.derive_host {
            return Err(ConfigError::MissingHost);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_ports() {
        let config = AgentConfig::default();
        assert_eq!(config.kubelet_port, "10255");
        assert_eq!(config.cadvisor_port, "4194");
        assert_eq!(config.connection_timeout_secs, 5);
        assert_eq!(config.kubernetes_labels, vec!["app".to_string()]);
        assert!(!config.report_container_metrics);
        assert!(config.send_io_stats);
    }

    #[test]
    fn validation_requires_a_host_source() {
        let mut config = AgentConfig::default();
        assert!(config.validate().is_err());

        config.derive_host = true;
        assert!(config.validate().is_ok());

        config.derive_host = false;
        config.host = Some("10.0.0.5".into());
        assert!(config.validate().is_ok());
    }
}
