//! Liveness and readiness state for the diagnostics service
//!
//! Missing accelerators or a silent inference server degrade the service
//! but leave it ready. A configured server URL that cannot be parsed makes
//! the prober unhealthy, which fails both checks until a restart.

use crate::error::{ProbeError, TelemetryError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Ordered from best to worst; the service reports its worst component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const TELEMETRY: &str = "telemetry";
    pub const PROBER: &str = "prober";
}

#[derive(Debug, Default)]
struct HealthState {
    components: BTreeMap<String, ComponentHealth>,
    initialized: bool,
}

impl HealthState {
    fn worst(&self) -> ComponentStatus {
        self.components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Shared, cloneable view of component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a component as healthy
    pub async fn register(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    async fn set(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let mut state = self.state.write().await;
        state
            .components
            .insert(name.to_string(), ComponentHealth::new(status, message));
    }

    /// Reflect the latest accelerator read
    pub async fn record_telemetry(&self, outcome: Result<(), &TelemetryError>) {
        match outcome {
            Ok(()) => self.set(components::TELEMETRY, ComponentStatus::Healthy, None).await,
            Err(err) => {
                self.set(
                    components::TELEMETRY,
                    ComponentStatus::Degraded,
                    Some(err.to_string()),
                )
                .await
            }
        }
    }

    /// Reflect whether the configured inference server answered
    pub async fn record_target(&self, url: &str, reachable: bool) {
        let mut state = self.state.write().await;
        // An invalid configured URL cannot recover at runtime
        if state
            .components
            .get(components::PROBER)
            .is_some_and(|c| c.status == ComponentStatus::Unhealthy)
        {
            return;
        }
        let health = if reachable {
            ComponentHealth::new(ComponentStatus::Healthy, None)
        } else {
            ComponentHealth::new(
                ComponentStatus::Degraded,
                Some(format!("{} is not answering", url)),
            )
        };
        state
            .components
            .insert(components::PROBER.to_string(), health);
    }

    /// Mark the prober unusable because its configured target is invalid
    pub async fn record_invalid_target(&self, err: &ProbeError) {
        self.set(
            components::PROBER,
            ComponentStatus::Unhealthy,
            Some(err.to_string()),
        )
        .await;
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.initialized = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: state.worst(),
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let reason = if !state.initialized {
            Some("Service not yet initialized".to_string())
        } else if state.worst() == ComponentStatus::Unhealthy {
            state
                .components
                .iter()
                .find(|(_, c)| c.status == ComponentStatus::Unhealthy)
                .map(|(name, c)| {
                    format!("{} unhealthy: {}", name, c.message.as_deref().unwrap_or("-"))
                })
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
