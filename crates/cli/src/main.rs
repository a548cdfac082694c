//! vLLM diagnostics CLI
//!
//! Reads local accelerator and host telemetry, probes a running vLLM
//! server and estimates serving capacity for a model.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{capacity, endpoints, system};
use diag_lib::CapacityRequest;
use std::path::PathBuf;

/// vLLM diagnostics CLI
#[derive(Parser)]
#[command(name = "vdiag")]
#[command(author, version, about = "Diagnostics and capacity planning for vLLM deployments", long_about = None)]
pub struct Cli {
    /// vLLM server URL (can also be set via VDIAG_VLLM_URL env var)
    #[arg(long, env = "VDIAG_VLLM_URL")]
    pub vllm_url: Option<String>,

    /// Per-request timeout in seconds for endpoint probes
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    /// Capacity policy JSON file (model sizes, coefficients, instance tiers)
    #[arg(long)]
    pub policy: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show accelerator and host hardware specifications
    GetSystemSpecs,

    /// Show current accelerator utilization
    GpuUtilization,

    /// Probe the vLLM server's API endpoints
    ListEndpoints,

    /// List the models loaded on the vLLM server
    GetLoadedModels,

    /// Show one loaded model and which APIs serve it
    ModelInfo {
        /// Model id as reported by /v1/models
        model_id: String,
    },

    /// Check connectivity to the vLLM server
    TestConnection,

    /// Fetch the vLLM server's Prometheus metrics
    ServerStats,

    /// Estimate memory needs for a model and suggest instance classes
    CheckCapacity {
        /// Model name, matched against the known-model size table
        #[arg(long)]
        model_name: String,

        /// Model size in GB (looked up by name when omitted)
        #[arg(long, value_parser = parse_positive_gb)]
        model_size_gb: Option<f64>,

        /// Expected batch size
        #[arg(long, default_value_t = 1)]
        batch_size: u32,
    },
}

fn parse_positive_gb(value: &str) -> Result<f64, String> {
    let size: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if size.is_finite() && size > 0.0 {
        Ok(size)
    } else {
        Err("model size must be a positive number of GB".to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep stdout clean for JSON; diagnostics go to stderr on request
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
    }

    let settings = config::Settings::resolve(&cli, config::Config::load()?)?;
    let format = settings.format;

    match cli.command {
        Commands::GetSystemSpecs => system::get_system_specs(format)?,
        Commands::GpuUtilization => system::gpu_utilization(format)?,
        Commands::ListEndpoints => endpoints::list_endpoints(&settings.prober(), format).await?,
        Commands::GetLoadedModels => {
            endpoints::get_loaded_models(&settings.prober(), format).await?
        }
        Commands::ModelInfo { model_id } => {
            endpoints::model_info(&settings.prober(), &model_id, format).await?
        }
        Commands::TestConnection => endpoints::test_connection(&settings.prober(), format).await?,
        Commands::ServerStats => endpoints::server_stats(&settings.prober(), format).await?,
        Commands::CheckCapacity {
            model_name,
            model_size_gb,
            batch_size,
        } => {
            let mut request = CapacityRequest::new(model_name).with_batch_size(batch_size);
            if let Some(size) = model_size_gb {
                request = request.with_model_size_gb(size);
            }
            capacity::check_capacity(&settings.policy, &request, format)?
        }
    }

    Ok(())
}
