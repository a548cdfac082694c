//! HTTP API exposing the diagnostics engine, health checks and Prometheus metrics

use crate::config::ServerConfig;
use diag_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::{DiagMetrics, StructuredLogger},
    probe::{default_catalog, EndpointProber},
    telemetry::{AcceleratorBackend, TelemetryReader},
    AcceleratorReading, CapacityPolicy, CapacityRequest, SystemSpecs,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Shared application state
pub struct AppState<B> {
    pub config: ServerConfig,
    pub telemetry: Arc<TelemetryReader<B>>,
    pub policy: CapacityPolicy,
    pub health_registry: HealthRegistry,
    pub metrics: DiagMetrics,
    pub logger: StructuredLogger,
}

impl<B: AcceleratorBackend + 'static> AppState<B> {
    pub fn new(
        config: ServerConfig,
        telemetry: Arc<TelemetryReader<B>>,
        policy: CapacityPolicy,
        health_registry: HealthRegistry,
        metrics: DiagMetrics,
    ) -> Self {
        let logger = StructuredLogger::new(&config.instance_name);
        Self {
            config,
            telemetry,
            policy,
            health_registry,
            metrics,
            logger,
        }
    }

    fn prober(&self, vllm_url: Option<String>) -> EndpointProber {
        EndpointProber::new(vllm_url.unwrap_or_else(|| self.config.vllm_url.clone()))
            .with_timeout(self.config.probe_timeout())
    }

    /// One bounded accelerator read, reflected into metrics and health
    async fn read_accelerators(&self) -> AcceleratorReading {
        let reading = self
            .telemetry
            .clone()
            .read_accelerators_within(self.config.telemetry_timeout())
            .await;

        match &reading {
            Ok(snapshot) => {
                self.metrics.set_accelerators_detected(snapshot.device_count());
                self.health_registry.record_telemetry(Ok(())).await;
            }
            Err(err) => {
                self.metrics.inc_telemetry_errors();
                self.health_registry.record_telemetry(Err(err)).await;
            }
        }

        reading
    }

    /// Fail health checks when the configured server URL is unusable
    pub async fn check_configured_target(&self) {
        if let Err(err) = self.prober(None).validate_target() {
            error!(error = %err, "Configured vLLM URL is invalid");
            self.health_registry.record_invalid_target(&err).await;
        }
    }

    /// Track whether the configured inference server answers at all
    async fn note_target_reachable(&self, explicit_target: bool, reachable: bool) {
        if explicit_target {
            return;
        }
        self.health_registry
            .record_target(&self.config.vllm_url, reachable)
            .await;
    }
}

/// Optional override of the configured inference server
#[derive(Debug, Default, Deserialize)]
pub struct TargetQuery {
    pub vllm_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfoQuery {
    pub model: String,
    pub vllm_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz<B: AcceleratorBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz<B: AcceleratorBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %err, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn system_specs<B: AcceleratorBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Json<SystemSpecs> {
    let reading = state.read_accelerators().await;
    let host = state.telemetry.read_host();
    Json(SystemSpecs::new(reading, host))
}

/// Accelerator snapshot, or 503 when the management layer is unusable
async fn gpu_utilization<B: AcceleratorBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Response {
    match state.read_accelerators().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
    }
}

async fn list_endpoints<B: AcceleratorBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<TargetQuery>,
) -> impl IntoResponse {
    let explicit = query.vllm_url.is_some();
    let prober = state.prober(query.vllm_url);

    let started = Instant::now();
    let report = prober.probe(&default_catalog()).await;
    let elapsed = started.elapsed();

    state.metrics.record_probe(&report, elapsed.as_secs_f64());
    state
        .logger
        .log_endpoint_probe(&report, elapsed.as_millis() as u64);
    state
        .note_target_reachable(explicit, report.summary.available_endpoints > 0)
        .await;

    Json(report)
}

async fn loaded_models<B: AcceleratorBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<TargetQuery>,
) -> impl IntoResponse {
    Json(state.prober(query.vllm_url).list_loaded_models().await)
}

async fn model_info<B: AcceleratorBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<ModelInfoQuery>,
) -> impl IntoResponse {
    Json(state.prober(query.vllm_url).model_info(&query.model).await)
}

async fn test_connection<B: AcceleratorBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<TargetQuery>,
) -> impl IntoResponse {
    let explicit = query.vllm_url.is_some();
    let check = state.prober(query.vllm_url).test_connection().await;
    state.note_target_reachable(explicit, check.reachable).await;
    Json(check)
}

async fn server_stats<B: AcceleratorBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<TargetQuery>,
) -> impl IntoResponse {
    Json(state.prober(query.vllm_url).server_stats().await)
}

async fn check_capacity<B: AcceleratorBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Json(request): Json<CapacityRequest>,
) -> Response {
    if request.model_name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "model_name must not be empty");
    }
    if let Some(size) = request.model_size_gb {
        if !size.is_finite() || size <= 0.0 {
            return error_response(StatusCode::BAD_REQUEST, "model_size_gb must be positive");
        }
    }

    let reading = state.read_accelerators().await;
    let recommendation = state.policy.estimate(&request, reading.as_ref());

    state.metrics.record_estimate(&recommendation);
    state.logger.log_capacity_estimate(&recommendation);

    Json(recommendation).into_response()
}

/// Create the API router
pub fn create_router<B: AcceleratorBackend + 'static>(state: Arc<AppState<B>>) -> Router {
    Router::new()
        .route("/healthz", get(healthz::<B>))
        .route("/readyz", get(readyz::<B>))
        .route("/metrics", get(metrics))
        .route("/api/v1/system", get(system_specs::<B>))
        .route("/api/v1/gpu", get(gpu_utilization::<B>))
        .route("/api/v1/endpoints", get(list_endpoints::<B>))
        .route("/api/v1/models", get(loaded_models::<B>))
        .route("/api/v1/models/info", get(model_info::<B>))
        .route("/api/v1/connection", get(test_connection::<B>))
        .route("/api/v1/server-stats", get(server_stats::<B>))
        .route("/api/v1/capacity", post(check_capacity::<B>))
        .with_state(state)
}

/// Start the API server; returns once `shutdown` resolves and connections drain
pub async fn serve<B, F>(port: u16, state: Arc<AppState<B>>, shutdown: F) -> anyhow::Result<()>
where
    B: AcceleratorBackend + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
