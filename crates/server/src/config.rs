//! Service configuration

use anyhow::{Context, Result};
use diag_lib::CapacityPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Service configuration, read from `VDIAG_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Inference server probed when a request names none
    #[serde(default = "default_vllm_url")]
    pub vllm_url: String,

    /// Per-request timeout for endpoint probes
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Upper bound on one accelerator read
    #[serde(default = "default_telemetry_timeout")]
    pub telemetry_timeout_secs: u64,

    /// Optional capacity policy JSON file
    #[serde(default)]
    pub policy_path: Option<String>,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "vdiag".to_string())
}

fn default_port() -> u16 {
    8080
}

fn default_vllm_url() -> String {
    diag_lib::probe::DEFAULT_BASE_URL.to_string()
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_telemetry_timeout() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            port: default_port(),
            vllm_url: default_vllm_url(),
            probe_timeout_secs: default_probe_timeout(),
            telemetry_timeout_secs: default_telemetry_timeout(),
            policy_path: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("VDIAG"))
            .build()?;

        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        config
            .try_deserialize()
            .context("Invalid VDIAG_* configuration")
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_secs(self.telemetry_timeout_secs)
    }

    /// The configured capacity policy, or the built-in one
    pub fn capacity_policy(&self) -> Result<CapacityPolicy> {
        match &self.policy_path {
            Some(path) => CapacityPolicy::from_json_file(path),
            None => Ok(CapacityPolicy::default()),
        }
    }
}
