//! Identity correlation between the kubelet and cAdvisor views
//!
//! The two documents are fetched sequentially and are not
//! transactionally consistent, so this is a best-effort join: a
//! container that matches nothing is reported as unaffiliated rather
//! than failing the cycle.

use crate::dimensions::{
    container_dimensions, ContainerDimensionMap, DimensionMap, PodDimensionMap, PodKey,
};
use crate::models::CadvisorSpec;

const POD_NAME_LABEL: &str = "io.kubernetes.pod.name";
const POD_NAMESPACE_LABEL: &str = "io.kubernetes.pod.namespace";
const CONTAINER_NAME_LABEL: &str = "io.kubernetes.container.name";

/// Join one cAdvisor entry to a pod, if possible.
///
/// Tries the alias list against the container index built from the pod
/// list first; failing that, treats the entry as a standalone or pause
/// container and attempts a label-based join. A label-derived pod key
/// that the pod index does not know (the pod appeared between the two
/// fetches) yields an unaffiliated container.
pub fn correlate_container(
    spec: &CadvisorSpec,
    instance_dimensions: &DimensionMap,
    container_index: &ContainerDimensionMap,
    pod_index: &PodDimensionMap,
) -> (Option<PodKey>, DimensionMap) {
    for alias in &spec.aliases {
        if let Some(known) = container_index.get(alias) {
            let pod_key = PodKey::from_dimensions(known);
            return (pod_key, known.clone());
        }
    }

    // Standalone or system container: start from instance dimensions.
    let first_alias = spec.aliases.first().map(String::as_str).unwrap_or("");
    let mut dimensions = container_dimensions(instance_dimensions, first_alias, &spec.image);

    if let Some(labels) = &spec.labels {
        if let (Some(pod_name), Some(namespace)) =
            (labels.get(POD_NAME_LABEL), labels.get(POD_NAMESPACE_LABEL))
        {
            let pod_key = PodKey::new(pod_name, namespace);
            // The pod may have shown up since the pod list was fetched.
            if let Some(pod_dims) = pod_index.get(&pod_key) {
                for (key, value) in pod_dims {
                    dimensions.insert(key.clone(), value.clone());
                }
                if let Some(container_name) = labels.get(CONTAINER_NAME_LABEL) {
                    dimensions.insert("container_name".into(), container_name.clone());
                }
                return (Some(pod_key), dimensions);
            }
        }
    }

    (None, dimensions)
}
