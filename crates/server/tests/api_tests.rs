//! Integration tests for the diagnostics API routes

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use diag_lib::{
    health::{components, HealthRegistry},
    observability::DiagMetrics,
    telemetry::{AcceleratorBackend, MemoryReading, TelemetryReader, UtilizationReading},
    CapacityPolicy, TelemetryError,
};
use std::sync::Arc;
use tower::ServiceExt;
use vdiag_server::{
    api::{create_router, AppState},
    config::ServerConfig,
};

const GIB: u64 = 1024 * 1024 * 1024;

/// One healthy 24 GiB accelerator
struct SingleGpu;

impl AcceleratorBackend for SingleGpu {
    fn driver_version(&self) -> Result<String, TelemetryError> {
        Ok("550.54.15".to_string())
    }

    fn device_count(&self) -> Result<u32, TelemetryError> {
        Ok(1)
    }

    fn device_name(&self, _index: u32) -> Result<String, TelemetryError> {
        Ok("NVIDIA L4".to_string())
    }

    fn memory(&self, _index: u32) -> Result<MemoryReading, TelemetryError> {
        Ok(MemoryReading {
            total: 24 * GIB,
            used: 2 * GIB,
            free: 22 * GIB,
        })
    }

    fn utilization(&self, _index: u32) -> Result<UtilizationReading, TelemetryError> {
        Ok(UtilizationReading { gpu: 17, memory: 4 })
    }

    fn temperature_celsius(&self, index: u32) -> Result<u32, TelemetryError> {
        Err(TelemetryError::query(index, "temperature", "Not Supported"))
    }

    fn power_usage_milliwatts(&self, _index: u32) -> Result<u32, TelemetryError> {
        Ok(35_000)
    }

    fn power_limit_milliwatts(&self, _index: u32) -> Result<u32, TelemetryError> {
        Ok(72_000)
    }
}

fn test_config(vllm_url: &str) -> ServerConfig {
    ServerConfig {
        instance_name: "test".to_string(),
        vllm_url: vllm_url.to_string(),
        probe_timeout_secs: 2,
        telemetry_timeout_secs: 2,
        ..ServerConfig::default()
    }
}

async fn setup_app(
    backend: Result<SingleGpu, TelemetryError>,
    vllm_url: &str,
) -> (Router, Arc<AppState<SingleGpu>>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::TELEMETRY).await;
    health_registry.register(components::PROBER).await;

    let telemetry = Arc::new(TelemetryReader::new(backend));
    if let Some(reason) = telemetry.unavailable_reason() {
        health_registry.record_telemetry(Err(reason)).await;
    }

    let state = Arc::new(AppState::new(
        test_config(vllm_url),
        telemetry,
        CapacityPolicy::default(),
        health_registry,
        DiagMetrics::new(),
    ));
    let router = create_router(state.clone());

    (router, state)
}

async fn gpu_app() -> (Router, Arc<AppState<SingleGpu>>) {
    setup_app(Ok(SingleGpu), "http://127.0.0.1:1").await
}

async fn no_gpu_app() -> (Router, Arc<AppState<SingleGpu>>) {
    setup_app(
        Err(TelemetryError::unavailable("NVML not available or failed to initialize")),
        "http://127.0.0.1:1",
    )
    .await
}

async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read_json(response).await
}

async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read_json(response).await
}

async fn read_json(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = gpu_app().await;

    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_degraded_without_accelerators() {
    let (app, _state) = no_gpu_app().await;

    let (status, health) = get(app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["telemetry"]["status"], "degraded");
    assert_eq!(health["components"]["prober"]["status"], "healthy");
}

#[tokio::test]
async fn test_invalid_configured_url_is_unhealthy() {
    let (app, state) = setup_app(Ok(SingleGpu), "localhost:8000").await;
    state.health_registry.set_ready(true).await;
    state.check_configured_target().await;

    let (status, health) = get(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(health["components"]["prober"]["status"], "unhealthy");

    // A failed connection attempt must not mask the bad configuration
    let _ = get(app.clone(), "/api/v1/connection").await;

    let (status, readiness) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
    assert!(readiness["reason"]
        .as_str()
        .unwrap()
        .contains("invalid base URL"));
}

#[tokio::test]
async fn test_valid_configured_url_stays_healthy() {
    let (app, state) = gpu_app().await;
    state.check_configured_target().await;

    let (status, health) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["components"]["prober"]["status"], "healthy");
}

#[tokio::test]
async fn test_readyz_follows_registry() {
    let (app, state) = no_gpu_app().await;

    let (status, _) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.health_registry.set_ready(true).await;
    let (status, readiness) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_exposes_diag_metrics() {
    let (app, _state) = no_gpu_app().await;
    // Trigger a failed telemetry read so the counter has a sample
    let _ = get(app.clone(), "/api/v1/gpu").await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("vdiag_telemetry_errors_total"));
    assert!(text.contains("vdiag_accelerators_detected"));
}

#[tokio::test]
async fn test_gpu_snapshot() {
    let (app, _state) = gpu_app().await;

    let (status, snapshot) = get(app, "/api/v1/gpu").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["driver_version"], "550.54.15");
    let device = &snapshot["devices"][0];
    assert_eq!(device["name"], "NVIDIA L4");
    assert_eq!(device["utilization_percent"], 17);
    assert!(device["temperature_celsius"].is_null());
    assert_eq!(device["power_watts_current"], 35.0);
}

#[tokio::test]
async fn test_gpu_unavailable_is_503() {
    let (app, _state) = no_gpu_app().await;

    let (status, body) = get(app, "/api/v1/gpu").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("NVML"));
}

#[tokio::test]
async fn test_system_specs_without_accelerators() {
    let (app, _state) = no_gpu_app().await;

    let (status, specs) = get(app, "/api/v1/system").await;

    assert_eq!(status, StatusCode::OK);
    assert!(specs["gpu"].is_null());
    assert!(specs["gpu_error"].as_str().unwrap().contains("NVML"));
    assert!(specs["host"]["cpu_logical_threads"].as_u64().unwrap() >= 1);
    assert!(specs["host"]["mem_total_bytes"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_capacity_on_local_gpu() {
    let (app, _state) = gpu_app().await;

    let (status, rec) = post_json(
        app,
        "/api/v1/capacity",
        serde_json::json!({"model_name": "custom", "model_size_gb": 7.0}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(rec["current_system_suitable"], true);
    assert_eq!(rec["batch_size"], 1);
    assert_eq!(rec["model_size_source"], "supplied");
    assert_eq!(rec["per_device_analysis"][0]["estimated_usage_percent"], 45.4);
    assert_eq!(rec["suggested_instance_classes"][0], "g4dn.xlarge");
    assert!(rec["telemetry_error"].is_null());
}

#[tokio::test]
async fn test_capacity_without_accelerators() {
    let (app, _state) = no_gpu_app().await;

    let (status, rec) = post_json(
        app,
        "/api/v1/capacity",
        serde_json::json!({"model_name": "meta-llama/Llama-2-70b"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(rec["model_size_gb"], 140.0);
    assert_eq!(rec["model_size_source"], "catalog");
    assert_eq!(rec["current_system_suitable"], false);
    assert_eq!(rec["per_device_analysis"].as_array().unwrap().len(), 0);
    assert!(rec["telemetry_error"].is_string());
    assert_eq!(rec["suggested_instance_classes"][0], "p4d.24xlarge");
}

#[tokio::test]
async fn test_capacity_rejects_non_positive_size() {
    let (app, _state) = gpu_app().await;

    let (status, body) = post_json(
        app,
        "/api/v1/capacity",
        serde_json::json!({"model_name": "x", "model_size_gb": -1.0}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("model_size_gb"));
}

#[tokio::test]
async fn test_endpoints_probe_with_override() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"object":"list","data":[{"id":"m1"}]}"#)
        .create_async()
        .await;
    let _mock = server
        .mock("GET", "/health")
        .with_status(200)
        .create_async()
        .await;

    let (app, _state) = gpu_app().await;
    let uri = format!("/api/v1/endpoints?vllm_url={}", server.url());

    let (status, report) = get(app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["summary"]["total_endpoints"], 7);
    assert_eq!(report["summary"]["available_endpoints"], 2);
    assert_eq!(report["endpoints"]["/v1/models"]["payload"]["data"][0]["id"], "m1");
    assert_eq!(report["endpoints"]["/v1/embeddings"]["available"], false);
}

#[tokio::test]
async fn test_unreachable_configured_target_degrades_prober() {
    let (app, _state) = gpu_app().await;

    let (status, check) = get(app.clone(), "/api/v1/connection").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["reachable"], false);
    assert!(check["error"].is_string());

    let (_, health) = get(app, "/healthz").await;
    assert_eq!(health["components"]["prober"]["status"], "degraded");
}

#[tokio::test]
async fn test_loaded_models_route() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_body(r#"{"data":[{"id":"m1"},{"id":"m2"}]}"#)
        .create_async()
        .await;

    let (app, _state) = setup_app(Ok(SingleGpu), &server.url()).await;

    let (status, models) = get(app, "/api/v1/models").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(models["success"], true);
    assert_eq!(models["count"], 2);
    assert_eq!(models["models"][1]["id"], "m2");
}

#[tokio::test]
async fn test_model_info_requires_model_param() {
    let (app, _state) = gpu_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/models/info")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_server_stats_route() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/metrics")
        .with_status(200)
        .with_body("vllm:num_requests_running 3\n")
        .create_async()
        .await;

    let (app, _state) = setup_app(Ok(SingleGpu), &server.url()).await;

    let (status, stats) = get(app, "/api/v1/server-stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["metrics_available"], true);
    assert!(stats["metrics"].as_str().unwrap().contains("num_requests_running"));
}
