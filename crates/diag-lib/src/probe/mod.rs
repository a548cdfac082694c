//! Remote endpoint discovery for inference servers
//!
//! Every public call acquires its own short-lived HTTP client and releases it
//! on return, whatever the outcome. Transport and decode failures are folded
//! into the returned result; nothing here returns `Err` to the caller.

mod catalog;


pub use catalog::{
    default_catalog, CatalogEntry, CHAT_COMPLETIONS_PATH, COMPLETIONS_PATH, EMBEDDINGS_PATH,
    HEALTH_PATH, METRICS_PATH, MODELS_PATH, VERSION_PATH,
};

use crate::error::ProbeError;
use crate::models::{
    ConnectionCheck, EndpointProbeReport, EndpointProbeResult, EndpointStatus, LoadedModels,
    ModelCapabilities, ModelCard, ModelInfo, ProbeSummary, ServerStats,
};
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default inference server location
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Prober for one inference server
#[derive(Debug, Clone)]
pub struct EndpointProber {
    base_url: String,
    timeout: Duration,
}

impl EndpointProber {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check that the base URL is an absolute http(s) URL
    pub fn validate_target(&self) -> Result<(), ProbeError> {
        let parsed = Url::parse(&self.base_url).map_err(|e| ProbeError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProbeError::InvalidUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        Ok(())
    }

    /// Validate the base URL and build a client scoped to one call
    fn session(&self) -> Result<Client, ProbeError> {
        self.validate_target()?;

        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(ProbeError::Unreachable)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Probe every catalog entry concurrently; results keep catalog order
    pub async fn probe(&self, catalog: &[CatalogEntry]) -> EndpointProbeReport {
        let started = Instant::now();

        let entries = match self.session() {
            Ok(client) => {
                join_all(catalog.iter().map(|entry| self.probe_entry(&client, entry))).await
            }
            Err(err) => {
                let message = err.to_string();
                catalog
                    .iter()
                    .map(|entry| unavailable(entry, message.clone()))
                    .collect()
            }
        };

        let endpoints = EndpointProbeResult::new(entries);
        let summary = ProbeSummary {
            total_endpoints: catalog.len(),
            available_endpoints: endpoints.available_count(),
        };

        debug!(
            base_url = %self.base_url,
            available = summary.available_endpoints,
            total = summary.total_endpoints,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Probed inference server endpoints"
        );

        EndpointProbeReport {
            base_url: self.base_url.clone(),
            endpoints,
            summary,
        }
    }

    async fn probe_entry(&self, client: &Client, entry: &CatalogEntry) -> EndpointStatus {
        let response = match client.get(self.url(&entry.path)).send().await {
            Ok(response) => response,
            Err(err) => {
                let err = ProbeError::from(err);
                debug!(path = %entry.path, error = %err, "Endpoint unreachable");
                return unavailable(entry, err.to_string());
            }
        };

        let status = response.status();
        let mut result = EndpointStatus {
            path: entry.path.clone(),
            available: status.as_u16() < 400,
            status_code: Some(status.as_u16()),
            description: entry.description.clone(),
            error: None,
            payload: None,
        };

        if entry.capture_payload && status == StatusCode::OK {
            match response.json::<serde_json::Value>().await {
                Ok(body) => result.payload = Some(body),
                Err(err) => {
                    result.error = Some(ProbeError::MalformedResponse(err.to_string()).to_string())
                }
            }
        }

        debug!(path = %entry.path, status = status.as_u16(), available = result.available, "Probed endpoint");
        result
    }

    /// One GET to the health path, timed
    pub async fn test_connection(&self) -> ConnectionCheck {
        let client = match self.session() {
            Ok(client) => client,
            Err(err) => return connection_failed(err),
        };

        let started = Instant::now();
        match client.get(self.url(HEALTH_PATH)).send().await {
            Ok(response) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                debug!(status = response.status().as_u16(), latency_ms, "Connection check succeeded");
                ConnectionCheck {
                    reachable: true,
                    status_code: Some(response.status().as_u16()),
                    latency_ms: Some(latency_ms),
                    error: None,
                }
            }
            Err(err) => connection_failed(ProbeError::from(err)),
        }
    }

    /// Models currently served, in response order
    pub async fn list_loaded_models(&self) -> LoadedModels {
        let result = match self.session() {
            Ok(client) => self.fetch_models(&client).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(models) => LoadedModels::loaded(models),
            Err(err) => {
                debug!(error = %err, "Failed to list loaded models");
                LoadedModels::failed(err.to_string())
            }
        }
    }

    async fn fetch_models(&self, client: &Client) -> Result<Vec<ModelCard>, ProbeError> {
        let response = client.get(self.url(MODELS_PATH)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProbeError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let listing: ModelListing = serde_json::from_str(&body)?;
        Ok(listing.data.into_iter().map(ModelCard::from_entry).collect())
    }

    /// Look one model up and report which serving APIs answer
    pub async fn model_info(&self, model_id: &str) -> ModelInfo {
        let loaded = self.list_loaded_models().await;
        if !loaded.success {
            return ModelInfo::failed(loaded.error.unwrap_or_default());
        }

        let Some(model) = loaded.models.into_iter().find(|m| m.id.as_deref() == Some(model_id)) else {
            return ModelInfo::failed(format!("Model '{}' not found in loaded models", model_id));
        };

        let report = self.probe(&default_catalog()).await;
        let capabilities = ModelCapabilities {
            chat: report.endpoints.is_available(CHAT_COMPLETIONS_PATH),
            completions: report.endpoints.is_available(COMPLETIONS_PATH),
            embeddings: report.endpoints.is_available(EMBEDDINGS_PATH),
        };

        ModelInfo {
            success: true,
            model: Some(model),
            capabilities: Some(capabilities),
            error: None,
        }
    }

    /// Raw Prometheus exposition from the server's metrics path
    pub async fn server_stats(&self) -> ServerStats {
        let result = match self.session() {
            Ok(client) => self.fetch_metrics(&client).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(Some(metrics)) => ServerStats {
                success: true,
                metrics_available: true,
                metrics: Some(metrics),
                error: None,
            },
            Ok(None) => ServerStats {
                success: false,
                metrics_available: false,
                metrics: None,
                error: Some("Metrics endpoint not available".to_string()),
            },
            Err(err) => ServerStats {
                success: false,
                metrics_available: false,
                metrics: None,
                error: Some(format!("Failed to get server stats: {}", err)),
            },
        }
    }

    async fn fetch_metrics(&self, client: &Client) -> Result<Option<String>, ProbeError> {
        let response = client.get(self.url(METRICS_PATH)).send().await?;
        if response.status() != StatusCode::OK {
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }
}

/// `{"object": "list", "data": [...]}`
#[derive(Debug, Deserialize)]
struct ModelListing {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

fn unavailable(entry: &CatalogEntry, error: String) -> EndpointStatus {
    EndpointStatus {
        path: entry.path.clone(),
        available: false,
        status_code: None,
        description: entry.description.clone(),
        error: Some(error),
        payload: None,
    }
}

fn connection_failed(err: ProbeError) -> ConnectionCheck {
    debug!(error = %err, "Connection check failed");
    ConnectionCheck {
        reachable: false,
        status_code: None,
        latency_ms: None,
        error: Some(err.to_string()),
    }
}
