//! Diagnostics engine for vLLM inference deployments
//!
//! This crate provides the core functionality for:
//! - Accelerator and host telemetry
//! - Remote endpoint probing of an inference server
//! - Serving capacity estimation
//! - Health checks and observability

pub mod capacity;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod probe;
pub mod telemetry;

pub use capacity::CapacityPolicy;
pub use error::{ProbeError, TelemetryError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{DiagMetrics, StructuredLogger};
pub use probe::{default_catalog, CatalogEntry, EndpointProber};
pub use telemetry::{AcceleratorBackend, NvmlBackend, TelemetryReader};
