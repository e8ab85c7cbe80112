//! Emission sink interface and sample types
//!
//! The check hands each normalized sample to a [`MetricSink`]; rate
//! emission kinds are derived per-second deltas computed downstream from
//! successive gauge observations, so the sink receives the raw gauge
//! value for both kinds.

use tracing::{error, info};

use crate::catalog;
use crate::dimensions::DimensionMap;

/// Emission kind of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Gauge,
    Rate,
}

/// Whether the sample is scoped to the node or to a pod/container.
///
/// Pod- and container-scoped samples suppress the host identity tag so
/// they do not get attributed to a single node downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostScope {
    Node,
    Suppressed,
}

/// One emitted sample.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub dimensions: DimensionMap,
    pub kind: SampleKind,
    pub scope: HostScope,
}

/// Destination for normalized telemetry samples.
pub trait MetricSink {
    fn gauge(&mut self, name: &str, value: f64, dimensions: &DimensionMap, scope: HostScope);

    fn rate(&mut self, name: &str, value: f64, dimensions: &DimensionMap, scope: HostScope);
}

/// Emit one value under every kind the unit catalog registers for its
/// canonical name.
///
/// `prefix` is the emission namespace ("container." or "pod."); the
/// catalog is keyed by the unprefixed canonical name. Rate emissions get
/// a `_sec` name suffix. Each emission carries a `unit` dimension for
/// its own kind. Samples carrying a `pod_name` dimension are emitted
/// with host identity suppressed.
pub fn emit_catalogued(
    sink: &mut dyn MetricSink,
    prefix: &str,
    canonical: &str,
    value: f64,
    dimensions: &DimensionMap,
) {
    let Some(spec) = catalog::entry(canonical) else {
        error!(
            metric = canonical,
            "canonical metric missing from unit catalog, dropping sample"
        );
        return;
    };

    let scope = if dimensions.contains_key("pod_name") {
        HostScope::Suppressed
    } else {
        HostScope::Node
    };

    for (kind, unit) in spec.kinds.iter().zip(spec.units.iter()) {
        let mut tagged = dimensions.clone();
        tagged.insert("unit".into(), (*unit).into());
        match kind {
            SampleKind::Gauge => {
                sink.gauge(&format!("{prefix}{canonical}"), value, &tagged, scope);
            }
            SampleKind::Rate => {
                sink.rate(&format!("{prefix}{canonical}_sec"), value, &tagged, scope);
            }
        }
    }
}

/// Sink that retains every sample; used by tests and by callers that
/// inspect a cycle's output before forwarding it.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub samples: Vec<MetricSample>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All samples with the given name.
    pub fn named(&self, name: &str) -> Vec<&MetricSample> {
        self.samples.iter().filter(|s| s.name == name).collect()
    }

    /// First value recorded under the given name, if any.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.samples.iter().find(|s| s.name == name).map(|s| s.value)
    }
}

impl MetricSink for RecordingSink {
    fn gauge(&mut self, name: &str, value: f64, dimensions: &DimensionMap, scope: HostScope) {
        self.samples.push(MetricSample {
            name: name.into(),
            value,
            dimensions: dimensions.clone(),
            kind: SampleKind::Gauge,
            scope,
        });
    }

    fn rate(&mut self, name: &str, value: f64, dimensions: &DimensionMap, scope: HostScope) {
        self.samples.push(MetricSample {
            name: name.into(),
            value,
            dimensions: dimensions.clone(),
            kind: SampleKind::Rate,
            scope,
        });
    }
}

/// Sink that writes each sample as a structured log event.
#[derive(Debug, Default)]
pub struct LogSink;

impl MetricSink for LogSink {
    fn gauge(&mut self, name: &str, value: f64, dimensions: &DimensionMap, scope: HostScope) {
        info!(
            event = "sample",
            kind = "gauge",
            metric = name,
            value,
            suppress_host = matches!(scope, HostScope::Suppressed),
            dimensions = ?dimensions,
            "Emitting gauge"
        );
    }

    fn rate(&mut self, name: &str, value: f64, dimensions: &DimensionMap, scope: HostScope) {
        info!(
            event = "sample",
            kind = "rate",
            metric = name,
            value,
            suppress_host = matches!(scope, HostScope::Suppressed),
            dimensions = ?dimensions,
            "Emitting rate observation"
        );
    }
}
