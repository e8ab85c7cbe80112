//! Agent library for Kubernetes node telemetry
//!
//! This crate provides the core functionality for:
//! - Polling the kubelet and cAdvisor node endpoints
//! - Correlating container identities across the two views
//! - Resolving pod owner workloads
//! - Unit conversion and per-pod aggregation
//! - Health checks and observability

pub mod aggregate;
pub mod catalog;
pub mod check;
pub mod client;
pub mod convert;
pub mod correlate;
pub mod dimensions;
pub mod emit;
pub mod error;
pub mod extract;
pub mod health;
pub mod models;
pub mod observability;
pub mod owners;

pub use check::{CheckConfig, CycleReport, KubernetesCheck};
pub use dimensions::{DimensionMap, PodKey};
pub use emit::{HostScope, LogSink, MetricSample, MetricSink, RecordingSink, SampleKind};
pub use error::{ConfigError, FetchError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use observability::{AgentMetrics, StructuredLogger};
