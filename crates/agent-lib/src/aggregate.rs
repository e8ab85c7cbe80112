//! Per-pod aggregation of container samples
//!
//! Values are true sums across a pod's containers; nothing is averaged.
//! Network counters are additionally keyed by interface so traffic on
//! eth0 never mixes with eth1.

use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use crate::dimensions::{with_leaf, PodDimensionMap, PodKey};
use crate::emit::{emit_catalogued, MetricSink};

/// Cycle-scoped accumulator for pod-level sums.
///
/// A pod key only appears once a container has contributed a sample;
/// absent metrics are never materialized as zeros.
#[derive(Debug, Default)]
pub struct PodAccumulator {
    scalars: HashMap<PodKey, BTreeMap<String, f64>>,
    network: HashMap<PodKey, BTreeMap<String, BTreeMap<String, f64>>>,
}

impl PodAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cpu/memory sample to the pod's running sum.
    pub fn add_scalar(&mut self, pod_key: &PodKey, metric_name: &str, value: f64) {
        *self
            .scalars
            .entry(pod_key.clone())
            .or_default()
            .entry(metric_name.to_string())
            .or_insert(0.0) += value;
    }

    /// Add a network sample to the pod's per-interface running sum.
    pub fn add_network(
        &mut self,
        pod_key: &PodKey,
        interface: &str,
        metric_name: &str,
        value: f64,
    ) {
        *self
            .network
            .entry(pod_key.clone())
            .or_default()
            .entry(interface.to_string())
            .or_default()
            .entry(metric_name.to_string())
            .or_insert(0.0) += value;
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.network.is_empty()
    }

    /// Emit every accumulated sum as a pod-level sample.
    pub fn flush(self, pod_index: &PodDimensionMap, sink: &mut dyn MetricSink) {
        for (pod_key, metrics) in &self.scalars {
            let Some(pod_dimensions) = pod_index.get(pod_key) else {
                warn!(
                    pod = %pod_key.name,
                    namespace = %pod_key.namespace,
                    "No dimensions recorded for accumulated pod, dropping sums"
                );
                continue;
            };
            for (metric_name, value) in metrics {
                emit_catalogued(sink, "pod.", metric_name, *value, pod_dimensions);
            }
        }

        for (pod_key, interfaces) in &self.network {
            let Some(pod_dimensions) = pod_index.get(pod_key) else {
                warn!(
                    pod = %pod_key.name,
                    namespace = %pod_key.namespace,
                    "No dimensions recorded for accumulated pod, dropping network sums"
                );
                continue;
            };
            for (interface, metrics) in interfaces {
                let interface_dimensions = with_leaf(pod_dimensions, "interface", interface);
                for (metric_name, value) in metrics {
                    emit_catalogued(sink, "pod.", metric_name, *value, &interface_dimensions);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::DimensionMap;
    use crate::emit::RecordingSink;

    fn pod_index(key: &PodKey) -> PodDimensionMap {
        let mut dims = DimensionMap::new();
        dims.insert("pod_name".into(), key.name.clone());
        dims.insert("namespace".into(), key.namespace.clone());
        let mut index = PodDimensionMap::new();
        index.insert(key.clone(), dims);
        index
    }

    #[test]
    fn scalar_sums_across_containers() {
        let key = PodKey::new("web-1", "default");
        let mut acc = PodAccumulator::new();
        acc.add_scalar(&key, "mem.rss_bytes", 100.0);
        acc.add_scalar(&key, "mem.rss_bytes", 150.0);

        let mut sink = RecordingSink::new();
        acc.flush(&pod_index(&key), &mut sink);

        assert_eq!(sink.value("pod.mem.rss_bytes").unwrap(), 250.0);
    }

    #[test]
    fn network_sums_are_keyed_per_interface() {
        let key = PodKey::new("web-1", "default");
        let mut acc = PodAccumulator::new();
        acc.add_network(&key, "eth0", "net.in_bytes", 10.0);
        acc.add_network(&key, "eth0", "net.in_bytes", 10.0);
        acc.add_network(&key, "eth1", "net.in_bytes", 7.0);

        let mut sink = RecordingSink::new();
        acc.flush(&pod_index(&key), &mut sink);

        let samples = sink.named("pod.net.in_bytes");
        let eth0 = samples
            .iter()
            .find(|s| s.dimensions.get("interface").map(String::as_str) == Some("eth0"))
            .unwrap();
        let eth1 = samples
            .iter()
            .find(|s| s.dimensions.get("interface").map(String::as_str) == Some("eth1"))
            .unwrap();
        assert_eq!(eth0.value, 20.0);
        assert_eq!(eth1.value, 7.0);
    }

    #[test]
    fn pods_without_contributions_never_appear() {
        let acc = PodAccumulator::new();
        assert!(acc.is_empty());

        let mut sink = RecordingSink::new();
        acc.flush(&PodDimensionMap::new(), &mut sink);
        assert!(sink.samples.is_empty());
    }

    #[test]
    fn unknown_pod_key_is_dropped_not_fatal() {
        let key = PodKey::new("vanished", "default");
        let mut acc = PodAccumulator::new();
        acc.add_scalar(&key, "mem.rss_bytes", 1.0);

        let mut sink = RecordingSink::new();
        acc.flush(&PodDimensionMap::new(), &mut sink);
        assert!(sink.samples.is_empty());
    }
}
