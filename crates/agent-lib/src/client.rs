//! HTTP clients for the node endpoints and the cluster API
//!
//! [`NodeClient`] talks plain HTTP to the kubelet and cAdvisor ports on
//! the node. [`KubeApiClient`] talks to the cluster API server with the
//! service-account token, and backs both the ReplicaSet secondary
//! lookup and host derivation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::FetchError;
use crate::models::{ApiPod, ReplicaSet};
use crate::owners::ReplicaSetLookup;

const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Client for the kubelet-style and cAdvisor-style node endpoints.
#[derive(Debug, Clone)]
pub struct NodeClient {
    client: reqwest::Client,
}

impl NodeClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// GET a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::Transport)?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status(),
                url: url.to_string(),
            });
        }
        response.json().await.map_err(FetchError::Decode)
    }

    /// GET a plain-text body.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::Transport)?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status(),
                url: url.to_string(),
            });
        }
        response.text().await.map_err(FetchError::Decode)
    }
}

/// In-cluster API server client.
pub struct KubeApiClient {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl KubeApiClient {
    /// Construct from the in-cluster environment: downward-API service
    /// host/port variables, service-account token and cluster CA.
    pub fn in_cluster(timeout: Duration) -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .context("KUBERNETES_SERVICE_HOST not set; not running in a cluster")?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
        let base_url = Url::parse(&format!("https://{}:{}", host, port))
            .context("Invalid API server address")?;

        let token = std::fs::read_to_string(PathBuf::from(SERVICE_ACCOUNT_TOKEN))
            .context("Failed to read service account token")?
            .trim()
            .to_string();

        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Ok(pem) = std::fs::read(SERVICE_ACCOUNT_CA) {
            let certificate = reqwest::Certificate::from_pem(&pem)
                .context("Failed to parse cluster CA certificate")?;
            builder = builder.add_root_certificate(certificate);
        }
        let client = builder.build().context("Failed to create API client")?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Construct against an explicit endpoint (tests).
    pub fn with_endpoint(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to create API client")?,
            base_url: Url::parse(base_url).context("Invalid API URL")?,
            token: token.into(),
        })
    }

    /// GET a JSON document from an API path.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = self.base_url.join(path).map_err(|_| FetchError::Status {
            status: reqwest::StatusCode::BAD_REQUEST,
            url: path.to_string(),
        })?;
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(FetchError::Transport)?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status(),
                url: url.to_string(),
            });
        }
        response.json().await.map_err(FetchError::Decode)
    }

    /// Resolve the node address hosting this agent's own pod, using the
    /// downward-API pod name/namespace variables.
    pub async fn agent_pod_host(&self) -> Result<String> {
        let pod_name = std::env::var("POD_NAME").context("POD_NAME not set")?;
        let namespace = std::env::var("POD_NAMESPACE").context("POD_NAMESPACE not set")?;
        let pod: ApiPod = self
            .get_json(&format!("/api/v1/namespaces/{}/pods/{}", namespace, pod_name))
            .await
            .context("Failed to fetch agent pod from API server")?;
        pod.status
            .and_then(|s| s.host_ip)
            .context("Agent pod has no hostIP yet")
    }
}

#[async_trait]
impl ReplicaSetLookup for KubeApiClient {
    async fn replica_set_annotations(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<HashMap<String, String>> {
        let replica_set: ReplicaSet = self
            .get_json(&format!(
                "/apis/extensions/v1beta1/namespaces/{}/replicasets/{}",
                namespace, name
            ))
            .await
            .with_context(|| format!("Failed to fetch replicaset {namespace}/{name}"))?;
        Ok(replica_set.metadata.annotations.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn node_client_surfaces_transport_failures() {
        let client = NodeClient::new(Duration::from_millis(200)).unwrap();
        // Nothing listens on this port
        let result = client.get_text("http://127.0.0.1:1/healthz").await;
        assert!(matches!(result, Err(FetchError::Transport(_))));
    }

    #[tokio::test]
    async fn node_client_surfaces_http_errors() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/pods")
            .with_status(500)
            .create_async()
            .await;

        let client = NodeClient::new(Duration::from_secs(1)).unwrap();
        let result: Result<serde_json::Value, _> =
            client.get_json(&format!("{}/pods", server.url())).await;
        assert!(matches!(result, Err(FetchError::Status { .. })));
    }

    #[tokio::test]
    async fn replica_set_lookup_returns_annotations() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock(
                "GET",
                "/apis/extensions/v1beta1/namespaces/default/replicasets/web-7d9f8c6b8",
            )
            .with_status(200)
            .with_body(
                r#"{"metadata": {"annotations": {"deployment.kubernetes.io/revision": "2"}}}"#,
            )
            .create_async()
            .await;

        let api =
            KubeApiClient::with_endpoint(&server.url(), "token", Duration::from_secs(1)).unwrap();
        let annotations = api
            .replica_set_annotations("default", "web-7d9f8c6b8")
            .await
            .unwrap();
        assert_eq!(
            annotations.get("deployment.kubernetes.io/revision").unwrap(),
            "2"
        );
    }
}
