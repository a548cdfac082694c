//! vdiag-server - vLLM diagnostics service
//!
//! Runs next to an inference server and exposes accelerator telemetry,
//! endpoint discovery and capacity estimates over HTTP.

use anyhow::{Context, Result};
use diag_lib::{
    health::{components, HealthRegistry},
    observability::{DiagMetrics, StructuredLogger},
    telemetry::TelemetryReader,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vdiag_server::{api, config};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting vdiag-server");

    let config = config::ServerConfig::load()?;
    let policy = config
        .capacity_policy()
        .context("Failed to load capacity policy")?;
    info!(
        vllm_url = %config.vllm_url,
        known_models = policy.known_models.len(),
        "Service configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::TELEMETRY).await;
    health_registry.register(components::PROBER).await;

    let metrics = DiagMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    // NVML is initialized once here and shut down explicitly on exit
    let telemetry = Arc::new(TelemetryReader::from_nvml());
    if let Some(reason) = telemetry.unavailable_reason() {
        health_registry.record_telemetry(Err(reason)).await;
        metrics.inc_telemetry_errors();
        logger.log_telemetry_unavailable(&reason.to_string());
    }

    logger.log_startup(SERVICE_VERSION, config.port, &config.vllm_url);

    let port = config.port;
    let app_state = Arc::new(api::AppState::new(
        config,
        telemetry.clone(),
        policy,
        health_registry.clone(),
        metrics,
    ));

    app_state.check_configured_target().await;
    health_registry.set_ready(true).await;

    let shutdown_logger = logger.clone();
    api::serve(port, app_state, async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for shutdown signal");
            return;
        }
        shutdown_logger.log_shutdown("SIGINT received");
    })
    .await
    .context("API server failed")?;

    match Arc::try_unwrap(telemetry) {
        Ok(reader) => reader.shutdown(),
        Err(_) => warn!("Telemetry still in use at exit, skipping explicit shutdown"),
    }

    info!("Shutting down");
    Ok(())
}
