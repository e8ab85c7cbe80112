//! Unit catalog: canonical metric name -> emission kinds and units
//!
//! Every canonical name produced by the extractor must resolve here; a
//! miss at emission time is an invariant violation, not an expected
//! runtime condition.

use crate::emit::SampleKind;

/// Emission kinds and their units for one canonical metric.
///
/// `kinds` and `units` are parallel: element `i` of `units` is the unit
/// string for element `i` of `kinds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSpec {
    pub kinds: &'static [SampleKind],
    pub units: &'static [&'static str],
}

const CPU_TIME: MetricSpec = MetricSpec {
    kinds: &[SampleKind::Gauge, SampleKind::Rate],
    units: &["core_seconds", "core_seconds_per_second"],
};

const MEMORY_BYTES: MetricSpec = MetricSpec {
    kinds: &[SampleKind::Gauge],
    units: &["bytes"],
};

const COUNT: MetricSpec = MetricSpec {
    kinds: &[SampleKind::Gauge],
    units: &["count"],
};

const FS_BYTES: MetricSpec = MetricSpec {
    kinds: &[SampleKind::Gauge],
    units: &["bytes"],
};

const FS_IO: MetricSpec = MetricSpec {
    kinds: &[SampleKind::Gauge, SampleKind::Rate],
    units: &["bytes", "bytes_per_second"],
};

const NET_BYTES: MetricSpec = MetricSpec {
    kinds: &[SampleKind::Gauge, SampleKind::Rate],
    units: &["bytes", "bytes_per_second"],
};

const NET_PACKETS: MetricSpec = MetricSpec {
    kinds: &[SampleKind::Gauge, SampleKind::Rate],
    units: &["packets", "packets_per_second"],
};

const NET_ERRORS: MetricSpec = MetricSpec {
    kinds: &[SampleKind::Gauge, SampleKind::Rate],
    units: &["errors", "errors_per_second"],
};

/// Look up the emission spec for a canonical metric name.
pub fn entry(name: &str) -> Option<&'static MetricSpec> {
    match name {
        "cpu.system_time" | "cpu.total_time" | "cpu.user_time" => Some(&CPU_TIME),
        "mem.rss_bytes" | "mem.swap_bytes" | "mem.cache_bytes" | "mem.used_bytes" => {
            Some(&MEMORY_BYTES)
        }
        "mem.fail_count" => Some(&COUNT),
        "fs.total_bytes" | "fs.usage_bytes" | "fs.io_current" => Some(&FS_BYTES),
        "fs.writes" | "fs.reads" => Some(&FS_IO),
        "net.in_bytes" | "net.out_bytes" => Some(&NET_BYTES),
        "net.in_packets" | "net.out_packets" | "net.in_dropped_packets"
        | "net.out_dropped_packets" => Some(&NET_PACKETS),
        "net.in_errors" | "net.out_errors" => Some(&NET_ERRORS),
        _ => None,
    }
}

/// All canonical names the extractor can produce.
pub const CANONICAL_NAMES: &[&str] = &[
    "cpu.system_time",
    "cpu.total_time",
    "cpu.user_time",
    "mem.rss_bytes",
    "mem.swap_bytes",
    "mem.cache_bytes",
    "mem.used_bytes",
    "mem.fail_count",
    "fs.total_bytes",
    "fs.usage_bytes",
    "fs.writes",
    "fs.reads",
    "fs.io_current",
    "net.in_bytes",
    "net.out_bytes",
    "net.in_packets",
    "net.out_packets",
    "net.in_dropped_packets",
    "net.out_dropped_packets",
    "net.in_errors",
    "net.out_errors",
];
