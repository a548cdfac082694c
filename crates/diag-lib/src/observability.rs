//! Observability infrastructure for the diagnostics engine
//!
//! Provides:
//! - Prometheus metrics (probe latency, endpoint outcomes, estimates, telemetry errors)
//! - Structured JSON logging with tracing

use crate::models::{CapacityRecommendation, EndpointProbeReport};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Probe passes are bounded by per-request timeouts, so buckets reach 30s
const PROBE_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DiagMetricsInner> = OnceLock::new();

struct DiagMetricsInner {
    probe_duration_seconds: Histogram,
    endpoint_checks: IntCounterVec,
    capacity_estimates: IntCounterVec,
    telemetry_errors: IntCounter,
    accelerators_detected: IntGauge,
}

impl DiagMetricsInner {
    fn new() -> Self {
        Self {
            probe_duration_seconds: register_histogram!(
                "vdiag_probe_duration_seconds",
                "Wall time of one endpoint probe pass",
                PROBE_BUCKETS.to_vec()
            )
            .expect("Failed to register probe_duration_seconds"),

            endpoint_checks: register_int_counter_vec!(
                "vdiag_endpoint_checks_total",
                "Endpoint checks by outcome",
                &["outcome"]
            )
            .expect("Failed to register endpoint_checks_total"),

            capacity_estimates: register_int_counter_vec!(
                "vdiag_capacity_estimates_total",
                "Capacity estimates by local suitability",
                &["suitable"]
            )
            .expect("Failed to register capacity_estimates_total"),

            telemetry_errors: register_int_counter!(
                "vdiag_telemetry_errors_total",
                "Accelerator telemetry reads that failed"
            )
            .expect("Failed to register telemetry_errors_total"),

            accelerators_detected: register_int_gauge!(
                "vdiag_accelerators_detected",
                "Accelerators seen by the last successful telemetry read"
            )
            .expect("Failed to register accelerators_detected"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct DiagMetrics {
    _private: (),
}

impl Default for DiagMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DiagMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DiagMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record one probe pass and the outcome of each endpoint in it
    pub fn record_probe(&self, report: &EndpointProbeReport, duration_secs: f64) {
        let inner = self.inner();
        inner.probe_duration_seconds.observe(duration_secs);

        let available = report.summary.available_endpoints as u64;
        let unavailable = (report.summary.total_endpoints as u64).saturating_sub(available);
        inner
            .endpoint_checks
            .with_label_values(&["available"])
            .inc_by(available);
        inner
            .endpoint_checks
            .with_label_values(&["unavailable"])
            .inc_by(unavailable);
    }

    pub fn record_estimate(&self, recommendation: &CapacityRecommendation) {
        let label = if recommendation.current_system_suitable {
            "true"
        } else {
            "false"
        };
        self.inner()
            .capacity_estimates
            .with_label_values(&[label])
            .inc();
    }

    pub fn inc_telemetry_errors(&self) {
        self.inner().telemetry_errors.inc();
    }

    pub fn set_accelerators_detected(&self, count: usize) {
        self.inner().accelerators_detected.set(count as i64);
    }
}

/// Structured logger for diagnostics events
///
/// Consistent event-tagged records for probes, estimates and the
/// service lifecycle.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_endpoint_probe(&self, report: &EndpointProbeReport, duration_ms: u64) {
        info!(
            event = "endpoint_probe",
            instance = %self.instance,
            base_url = %report.base_url,
            available_endpoints = report.summary.available_endpoints,
            total_endpoints = report.summary.total_endpoints,
            duration_ms = duration_ms,
            "Probed inference server endpoints"
        );
    }

    pub fn log_capacity_estimate(&self, recommendation: &CapacityRecommendation) {
        info!(
            event = "capacity_estimate",
            instance = %self.instance,
            model_name = %recommendation.model_name,
            model_size_gb = recommendation.model_size_gb,
            model_size_source = ?recommendation.model_size_source,
            batch_size = recommendation.batch_size,
            estimated_memory_requirement_gb = recommendation.estimated_memory_requirement_gb,
            current_system_suitable = recommendation.current_system_suitable,
            devices_analyzed = recommendation.per_device_analysis.len(),
            "Estimated serving capacity"
        );
    }

    /// Degraded operation, not a failure
    pub fn log_telemetry_unavailable(&self, reason: &str) {
        warn!(
            event = "telemetry_unavailable",
            instance = %self.instance,
            reason = %reason,
            "Accelerator telemetry unavailable, continuing without it"
        );
    }

    pub fn log_startup(&self, version: &str, port: u16, vllm_url: &str) {
        info!(
            event = "service_started",
            instance = %self.instance,
            version = %version,
            port = port,
            vllm_url = %vllm_url,
            "Diagnostics service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_stopped",
            instance = %self.instance,
            reason = %reason,
            "Diagnostics service shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EndpointProbeResult, ModelSizeSource, ProbeSummary};

    fn report(available: usize, total: usize) -> EndpointProbeReport {
        EndpointProbeReport {
            base_url: "http://localhost:8000".to_string(),
            endpoints: EndpointProbeResult::new(Vec::new()),
            summary: ProbeSummary {
                total_endpoints: total,
                available_endpoints: available,
            },
        }
    }

    #[test]
    fn test_diag_metrics_recording() {
        // Registration is global; every handle shares one set of metrics
        let metrics = DiagMetrics::new();
        let again = DiagMetrics::new();

        let before = metrics
            .inner()
            .endpoint_checks
            .with_label_values(&["unavailable"])
            .get();

        metrics.record_probe(&report(6, 7), 0.12);
        again.inc_telemetry_errors();
        again.set_accelerators_detected(2);

        let after = metrics
            .inner()
            .endpoint_checks
            .with_label_values(&["unavailable"])
            .get();
        assert!(after >= before + 1);
        assert_eq!(metrics.inner().accelerators_detected.get(), 2);
    }

    #[test]
    fn test_record_estimate_labels() {
        let metrics = DiagMetrics::new();
        let rec = CapacityRecommendation {
            model_name: "gpt2".to_string(),
            model_size_gb: 0.5,
            model_size_source: ModelSizeSource::Catalog,
            batch_size: 1,
            estimated_memory_requirement_gb: 3.1,
            current_system_suitable: false,
            per_device_analysis: vec![],
            suggested_instance_classes: vec![],
            telemetry_error: Some("none".to_string()),
        };

        let before = metrics
            .inner()
            .capacity_estimates
            .with_label_values(&["false"])
            .get();
        metrics.record_estimate(&rec);
        let after = metrics
            .inner()
            .capacity_estimates
            .with_label_values(&["false"])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("diag-0");
        assert_eq!(logger.instance, "diag-0");
    }
}
