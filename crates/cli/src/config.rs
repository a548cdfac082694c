//! Configuration management for the CLI

use anyhow::{Context, Result};
use clap::ValueEnum;
use diag_lib::{probe::DEFAULT_BASE_URL, CapacityPolicy, EndpointProber};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::output::OutputFormat;
use crate::Cli;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Defaults stored in `~/.config/vdiag/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// vLLM server URL
    pub vllm_url: Option<String>,
    /// Probe timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Default output format (`table` or `json`)
    pub default_format: Option<String>,
    /// Capacity policy JSON file
    pub policy_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the user's config file, if present
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("vdiag").join("config.json"))
    }
}

/// Effective settings: command line over config file over built-in defaults
#[derive(Debug, Clone)]
pub struct Settings {
    pub vllm_url: String,
    pub timeout: Duration,
    pub format: OutputFormat,
    pub policy: CapacityPolicy,
}

impl Settings {
    pub fn resolve(cli: &Cli, file: Config) -> Result<Self> {
        let format = match (cli.format, file.default_format.as_deref()) {
            (Some(format), _) => format,
            (None, Some(name)) => OutputFormat::from_str(name, true)
                .map_err(|e| anyhow::anyhow!("Invalid default_format in config file: {}", e))?,
            (None, None) => OutputFormat::default(),
        };

        let policy = match cli.policy.as_ref().or(file.policy_path.as_ref()) {
            Some(path) => CapacityPolicy::from_json_file(path)?,
            None => CapacityPolicy::default(),
        };

        Ok(Self {
            vllm_url: cli
                .vllm_url
                .clone()
                .or(file.vllm_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(
                cli.timeout_secs
                    .or(file.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            format,
            policy,
        })
    }

    pub fn prober(&self) -> EndpointProber {
        EndpointProber::new(&self.vllm_url).with_timeout(self.timeout)
    }
}
