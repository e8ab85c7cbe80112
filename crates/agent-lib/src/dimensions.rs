//! Dimension (tag) sets attached to emitted samples
//!
//! Dimensions are layered: instance -> pod -> container -> device/interface.
//! Each layer is an independent copy so mutating a child never leaks into
//! its parent.

use std::collections::{BTreeMap, HashMap};

use crate::models::PodMetadata;

/// Tag set attached to a metric sample. Ordered so that flush order and
/// test assertions are deterministic.
pub type DimensionMap = BTreeMap<String, String>;

/// Structured pod identity.
///
/// Keying pods by `name + namespace` string concatenation collides
/// (pod "ab" in "c" vs pod "a" in "bc"); a composite key removes that
/// ambiguity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodKey {
    pub name: String,
    pub namespace: String,
}

impl PodKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Derive the key from a dimension set carrying `pod_name` + `namespace`.
    pub fn from_dimensions(dimensions: &DimensionMap) -> Option<Self> {
        let name = dimensions.get("pod_name")?;
        let namespace = dimensions.get("namespace")?;
        Some(Self::new(name, namespace))
    }
}

/// Cycle-scoped map of pod key -> pod-level dimensions
pub type PodDimensionMap = HashMap<PodKey, DimensionMap>;

/// Cycle-scoped map of runtime container id -> container-level dimensions
pub type ContainerDimensionMap = HashMap<String, DimensionMap>;

/// Build the pod-level dimension layer: pod name, namespace and any
/// configured labels present on the pod. Owner dimensions are applied
/// separately by the owner resolver.
pub fn pod_dimensions(
    instance_dimensions: &DimensionMap,
    metadata: &PodMetadata,
    kubernetes_labels: &[String],
) -> DimensionMap {
    let mut dimensions = instance_dimensions.clone();
    dimensions.insert("pod_name".into(), metadata.name.clone());
    dimensions.insert("namespace".into(), metadata.namespace.clone());
    if let Some(pod_labels) = &metadata.labels {
        for label in kubernetes_labels {
            if let Some(value) = pod_labels.get(label) {
                dimensions.insert(label.clone(), value.clone());
            }
        }
    }
    dimensions
}

/// Extend pod dimensions to the container layer.
pub fn container_dimensions(
    pod_dimensions: &DimensionMap,
    container_name: &str,
    image: &str,
) -> DimensionMap {
    let mut dimensions = pod_dimensions.clone();
    dimensions.insert("container_name".into(), container_name.into());
    dimensions.insert("image".into(), image.into());
    dimensions
}

/// Extend container dimensions with a leaf tag (`device` or `interface`).
pub fn with_leaf(
    container_dimensions: &DimensionMap,
    key: &str,
    value: &str,
) -> DimensionMap {
    let mut dimensions = container_dimensions.clone();
    dimensions.insert(key.into(), value.into());
    dimensions
}
