//! Canonical sample extraction from one cAdvisor snapshot
//!
//! Walks the cpu/memory/filesystem/network sections of a container's
//! most recent stats, translating raw fields into catalogued canonical
//! names. Absent fields are skipped, never defaulted to zero.

use crate::aggregate::PodAccumulator;
use crate::convert::nanoseconds_to_seconds;
use crate::dimensions::{with_leaf, DimensionMap, PodKey};
use crate::emit::{emit_catalogued, MetricSink};
use crate::models::CadvisorStats;

/// Extracts canonical samples from container snapshots.
#[derive(Debug, Clone, Copy)]
pub struct MetricExtractor {
    /// Emit per-container samples in addition to pod aggregation.
    pub report_container_metrics: bool,
    /// Emit filesystem I/O counters (fs.writes, fs.reads, fs.io_current).
    pub send_io_stats: bool,
}

impl MetricExtractor {
    /// Process one container snapshot: emit container-level samples
    /// (when enabled) and feed the pod accumulator (always, for
    /// affiliated containers).
    pub fn process_snapshot(
        &self,
        stats: &CadvisorStats,
        container_dimensions: &DimensionMap,
        pod_key: Option<&PodKey>,
        accumulator: &mut PodAccumulator,
        sink: &mut dyn MetricSink,
    ) {
        if stats.has_memory {
            if let Some(memory) = &stats.memory {
                let fields: [(Option<u64>, &str); 5] = [
                    (memory.rss, "mem.rss_bytes"),
                    (memory.swap, "mem.swap_bytes"),
                    (memory.cache, "mem.cache_bytes"),
                    (memory.usage, "mem.used_bytes"),
                    (memory.failcnt, "mem.fail_count"),
                ];
                for (raw, canonical) in fields {
                    if let Some(raw) = raw {
                        self.scalar(canonical, raw as f64, container_dimensions, pod_key, accumulator, sink);
                    }
                }
            }
        }

        if stats.has_cpu {
            if let Some(usage) = stats.cpu.as_ref().and_then(|c| c.usage.as_ref()) {
                let fields: [(Option<u64>, &str); 3] = [
                    (usage.system, "cpu.system_time"),
                    (usage.total, "cpu.total_time"),
                    (usage.user, "cpu.user_time"),
                ];
                for (raw, canonical) in fields {
                    if let Some(nanoseconds) = raw {
                        let seconds = nanoseconds_to_seconds(nanoseconds);
                        self.scalar(canonical, seconds, container_dimensions, pod_key, accumulator, sink);
                    }
                }
            }
        }

        if stats.has_filesystem {
            if let Some(filesystems) = &stats.filesystem {
                self.filesystem(filesystems, container_dimensions, sink);
            }
        }

        if stats.has_network {
            if let Some(network) = &stats.network {
                for interface in &network.interfaces {
                    let interface_dimensions =
                        with_leaf(container_dimensions, "interface", &interface.name);
                    let fields: [(Option<u64>, &str); 8] = [
                        (interface.rx_bytes, "net.in_bytes"),
                        (interface.tx_bytes, "net.out_bytes"),
                        (interface.rx_packets, "net.in_packets"),
                        (interface.tx_packets, "net.out_packets"),
                        (interface.rx_dropped, "net.in_dropped_packets"),
                        (interface.tx_dropped, "net.out_dropped_packets"),
                        (interface.rx_errors, "net.in_errors"),
                        (interface.tx_errors, "net.out_errors"),
                    ];
                    for (raw, canonical) in fields {
                        if let Some(raw) = raw {
                            let value = raw as f64;
                            if self.report_container_metrics {
                                emit_catalogued(
                                    sink,
                                    "container.",
                                    canonical,
                                    value,
                                    &interface_dimensions,
                                );
                            }
                            if let Some(pod_key) = pod_key {
                                accumulator.add_network(pod_key, &interface.name, canonical, value);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Shared path for cpu/memory scalars.
    fn scalar(
        &self,
        canonical: &str,
        value: f64,
        container_dimensions: &DimensionMap,
        pod_key: Option<&PodKey>,
        accumulator: &mut PodAccumulator,
        sink: &mut dyn MetricSink,
    ) {
        if self.report_container_metrics {
            emit_catalogued(sink, "container.", canonical, value, container_dimensions);
        }
        if let Some(pod_key) = pod_key {
            accumulator.add_scalar(pod_key, canonical, value);
        }
    }

    /// Filesystem samples are container-scoped only; there is no pod
    /// aggregation for them.
    fn filesystem(
        &self,
        filesystems: &[crate::models::FilesystemStats],
        container_dimensions: &DimensionMap,
        sink: &mut dyn MetricSink,
    ) {
        if !self.report_container_metrics {
            return;
        }
        for fs in filesystems {
            let device_dimensions = with_leaf(container_dimensions, "device", &fs.device);
            let capacity_fields: [(Option<u64>, &str); 2] =
                [(fs.capacity, "fs.total_bytes"), (fs.usage, "fs.usage_bytes")];
            for (raw, canonical) in capacity_fields {
                if let Some(raw) = raw {
                    emit_catalogued(sink, "container.", canonical, raw as f64, &device_dimensions);
                }
            }
            if self.send_io_stats {
                let io_fields: [(Option<u64>, &str); 3] = [
                    (fs.writes_completed, "fs.writes"),
                    (fs.reads_completed, "fs.reads"),
                    (fs.io_in_progress, "fs.io_current"),
                ];
                for (raw, canonical) in io_fields {
                    if let Some(raw) = raw {
                        emit_catalogued(
                            sink,
                            "container.",
                            canonical,
                            raw as f64,
                            &device_dimensions,
                        );
                    }
                }
            }
        }
    }
}
