//! Owner workload resolution
//!
//! Classifies the controller that owns a pod into exactly one dimension.
//! Ownership is resolved through an ordered chain: explicit
//! `ownerReferences` first, then the legacy `kubernetes.io/created-by`
//! annotation. A ReplicaSet owner triggers a secondary API lookup to
//! distinguish a bare ReplicaSet from a Deployment-managed one.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::dimensions::DimensionMap;
use crate::models::PodMetadata;

/// Legacy annotation carrying the creator reference as embedded JSON.
pub const CREATED_BY_ANNOTATION: &str = "kubernetes.io/created-by";

/// Annotation marking a ReplicaSet as Deployment-managed.
pub const DEPLOYMENT_REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

/// Secondary lookup used to classify ReplicaSet owners.
///
/// Implemented by the in-cluster API client; tests substitute mocks.
#[async_trait]
pub trait ReplicaSetLookup: Send + Sync {
    /// Annotations of the named ReplicaSet object.
    async fn replica_set_annotations(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<HashMap<String, String>>;
}

/// The resolved owning workload of a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodOwner {
    ReplicationController(String),
    ReplicaSet(String),
    Deployment(String),
    DaemonSet(String),
}

impl PodOwner {
    /// Dimension key/value this owner contributes.
    pub fn dimension(&self) -> (&'static str, &str) {
        match self {
            PodOwner::ReplicationController(name) => ("replication_controller", name),
            PodOwner::ReplicaSet(name) => ("replica_set", name),
            PodOwner::Deployment(name) => ("deployment", name),
            PodOwner::DaemonSet(name) => ("daemon_set", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OwnerRef {
    kind: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedBy {
    reference: CreatedByReference,
}

#[derive(Debug, Deserialize)]
struct CreatedByReference {
    kind: String,
    name: String,
}

/// First step of the chain: find the owner reference, if any.
fn owner_reference(metadata: &PodMetadata) -> Option<OwnerRef> {
    if let Some(references) = metadata.owner_references.as_deref() {
        if let Some(first) = references.first() {
            if references.len() > 1 {
                warn!(
                    pod = %metadata.name,
                    count = references.len(),
                    "Pod has more than one owner reference, using the first"
                );
            }
            return Some(OwnerRef {
                kind: first.kind.clone(),
                name: first.name.clone(),
            });
        }
    }

    let annotation = metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(CREATED_BY_ANNOTATION));
    if let Some(raw) = annotation {
        match serde_json::from_str::<CreatedBy>(raw) {
            Ok(created_by) => {
                return Some(OwnerRef {
                    kind: created_by.reference.kind,
                    name: created_by.reference.name,
                });
            }
            Err(e) => {
                info!(pod = %metadata.name, error = %e, "Could not decode created-by annotation");
            }
        }
    }

    info!(pod = %metadata.name, "No owner reference found for pod");
    None
}

/// Deployment name derived by stripping the ReplicaSet's trailing
/// pod-template-hash segment. Returns None when nothing remains.
fn deployment_name(replica_set_name: &str) -> Option<String> {
    let (head, _) = replica_set_name.rsplit_once('-')?;
    if head.is_empty() {
        None
    } else {
        Some(head.to_string())
    }
}

/// Resolve the owning workload of a pod.
///
/// Secondary-lookup failures never propagate: the raw ReplicaSet name is
/// reported instead.
pub async fn resolve(
    metadata: &PodMetadata,
    lookup: Option<&dyn ReplicaSetLookup>,
) -> Option<PodOwner> {
    let reference = owner_reference(metadata)?;

    match reference.kind.as_str() {
        "ReplicationController" => Some(PodOwner::ReplicationController(reference.name)),
        "DaemonSet" => Some(PodOwner::DaemonSet(reference.name)),
        "ReplicaSet" => {
            let Some(lookup) = lookup else {
                warn!(
                    pod = %metadata.name,
                    "No API connection to resolve deployment name, reporting ReplicaSet"
                );
                return Some(PodOwner::ReplicaSet(reference.name));
            };
            match lookup
                .replica_set_annotations(&metadata.namespace, &reference.name)
                .await
            {
                Ok(annotations) => {
                    if annotations.contains_key(DEPLOYMENT_REVISION_ANNOTATION) {
                        if let Some(deployment) = deployment_name(&reference.name) {
                            return Some(PodOwner::Deployment(deployment));
                        }
                    }
                    Some(PodOwner::ReplicaSet(reference.name))
                }
                Err(e) => {
                    warn!(
                        pod = %metadata.name,
                        replica_set = %reference.name,
                        error = %e,
                        "ReplicaSet lookup failed, reporting ReplicaSet"
                    );
                    Some(PodOwner::ReplicaSet(reference.name))
                }
            }
        }
        other => {
            info!(pod = %metadata.name, kind = %other, "Unsupported pod owner kind");
            None
        }
    }
}

/// Apply the owner dimension onto a pod's dimension set.
pub fn apply_owner_dimension(dimensions: &mut DimensionMap, owner: &PodOwner) {
    let (key, value) = owner.dimension();
    dimensions.insert(key.into(), value.into());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OwnerReference;
    use anyhow::anyhow;

    fn metadata(
        owner_references: Option<Vec<OwnerReference>>,
        annotations: Option<HashMap<String, String>>,
    ) -> PodMetadata {
        PodMetadata {
            name: "web-7d9f8c6b8-x2v4q".into(),
            namespace: "default".into(),
            labels: None,
            owner_references,
            annotations,
        }
    }

    struct FixedLookup {
        annotations: HashMap<String, String>,
    }

    #[async_trait]
    impl ReplicaSetLookup for FixedLookup {
        async fn replica_set_annotations(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> Result<HashMap<String, String>> {
            Ok(self.annotations.clone())
        }
    }

    struct FailingLookup;

    #[async_trait]
    impl ReplicaSetLookup for FailingLookup {
        async fn replica_set_annotations(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> Result<HashMap<String, String>> {
            Err(anyhow!("connection refused"))
        }
    }

    fn reference(kind: &str, name: &str) -> OwnerReference {
        OwnerReference {
            kind: kind.into(),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn daemon_set_maps_to_daemon_set_dimension() {
        let meta = metadata(Some(vec![reference("DaemonSet", "fluentd")]), None);
        let owner = resolve(&meta, None).await.unwrap();
        assert_eq!(owner, PodOwner::DaemonSet("fluentd".into()));
        assert_eq!(owner.dimension(), ("daemon_set", "fluentd"));
    }

    #[tokio::test]
    async fn replication_controller_maps_directly() {
        let meta = metadata(Some(vec![reference("ReplicationController", "rc-1")]), None);
        let owner = resolve(&meta, None).await.unwrap();
        assert_eq!(owner, PodOwner::ReplicationController("rc-1".into()));
    }

    #[tokio::test]
    async fn deployment_managed_replica_set_strips_hash_segment() {
        let mut annotations = HashMap::new();
        annotations.insert(DEPLOYMENT_REVISION_ANNOTATION.to_string(), "3".to_string());
        let lookup = FixedLookup { annotations };

        let meta = metadata(Some(vec![reference("ReplicaSet", "web-7d9f8c6b8")]), None);
        let owner = resolve(&meta, Some(&lookup)).await.unwrap();
        assert_eq!(owner, PodOwner::Deployment("web".into()));
    }

    #[tokio::test]
    async fn bare_replica_set_stays_replica_set() {
        let lookup = FixedLookup {
            annotations: HashMap::new(),
        };
        let meta = metadata(Some(vec![reference("ReplicaSet", "web-7d9f8c6b8")]), None);
        let owner = resolve(&meta, Some(&lookup)).await.unwrap();
        assert_eq!(owner, PodOwner::ReplicaSet("web-7d9f8c6b8".into()));
    }

    #[tokio::test]
    async fn lookup_failure_falls_back_to_replica_set() {
        let meta = metadata(Some(vec![reference("ReplicaSet", "web-7d9f8c6b8")]), None);
        let owner = resolve(&meta, Some(&FailingLookup)).await.unwrap();
        assert_eq!(owner, PodOwner::ReplicaSet("web-7d9f8c6b8".into()));
    }

    #[tokio::test]
    async fn missing_lookup_falls_back_to_replica_set() {
        let meta = metadata(Some(vec![reference("ReplicaSet", "web-7d9f8c6b8")]), None);
        let owner = resolve(&meta, None).await.unwrap();
        assert_eq!(owner, PodOwner::ReplicaSet("web-7d9f8c6b8".into()));
    }

    #[tokio::test]
    async fn multiple_references_first_wins() {
        let meta = metadata(
            Some(vec![
                reference("DaemonSet", "first"),
                reference("ReplicationController", "second"),
            ]),
            None,
        );
        let owner = resolve(&meta, None).await.unwrap();
        assert_eq!(owner, PodOwner::DaemonSet("first".into()));
    }

    #[tokio::test]
    async fn legacy_annotation_is_used_when_references_absent() {
        let mut annotations = HashMap::new();
        annotations.insert(
            CREATED_BY_ANNOTATION.to_string(),
            r#"{"reference": {"kind": "DaemonSet", "name": "node-exporter"}}"#.to_string(),
        );
        let meta = metadata(None, Some(annotations));
        let owner = resolve(&meta, None).await.unwrap();
        assert_eq!(owner, PodOwner::DaemonSet("node-exporter".into()));
    }

    #[tokio::test]
    async fn unsupported_kind_sets_no_dimension() {
        let meta = metadata(Some(vec![reference("Job", "batch-1")]), None);
        assert!(resolve(&meta, None).await.is_none());
    }

    #[tokio::test]
    async fn garbage_annotation_resolves_to_no_owner() {
        let mut annotations = HashMap::new();
        annotations.insert(CREATED_BY_ANNOTATION.to_string(), "not json".to_string());
        let meta = metadata(None, Some(annotations));
        assert!(resolve(&meta, None).await.is_none());
    }

    #[test]
    fn hashless_replica_set_name_yields_no_deployment() {
        assert_eq!(deployment_name("web-7d9f8c6b8"), Some("web".into()));
        assert_eq!(deployment_name("standalone"), None);
    }

    #[test]
    fn owner_dimension_application() {
        let mut dims = DimensionMap::new();
        apply_owner_dimension(&mut dims, &PodOwner::Deployment("web".into()));
        assert_eq!(dims.get("deployment").unwrap(), "web");
        assert_eq!(dims.len(), 1);
    }
}
