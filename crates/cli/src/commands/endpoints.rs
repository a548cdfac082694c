//! Remote vLLM server CLI commands

use anyhow::Result;
use colored::Colorize;
use diag_lib::{default_catalog, EndpointProber, ModelCard};
use tabled::Tabled;

use crate::output::{
    color_available, print_error, print_heading, print_info, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

/// Row for endpoint probe table
#[derive(Tabled)]
struct EndpointRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "HTTP")]
    status_code: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// Row for loaded models table
#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    id: String,
    #[tabled(rename = "Owner")]
    owned_by: String,
    #[tabled(rename = "Max Len")]
    max_model_len: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&ModelCard> for ModelRow {
    fn from(model: &ModelCard) -> Self {
        Self {
            id: model.id.clone().unwrap_or_else(|| "-".to_string()),
            owned_by: model.owned_by.clone().unwrap_or_else(|| "-".to_string()),
            max_model_len: model
                .max_model_len
                .map(|len| len.to_string())
                .unwrap_or_else(|| "-".to_string()),
            created: model
                .created
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Probe the default endpoint catalog
pub async fn list_endpoints(prober: &EndpointProber, format: OutputFormat) -> Result<()> {
    let report = prober.probe(&default_catalog()).await;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_heading("vLLM Endpoints");
            println!("Server: {}", report.base_url.cyan());
            println!();

            let rows: Vec<EndpointRow> = report
                .endpoints
                .iter()
                .map(|e| EndpointRow {
                    path: e.path.clone(),
                    status: color_available(e.available),
                    status_code: e
                        .status_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    description: e.description.clone(),
                })
                .collect();
            print_table(rows);

            println!(
                "\n{} of {} endpoints available",
                report.summary.available_endpoints, report.summary.total_endpoints
            );
            for entry in report.endpoints.iter().filter(|e| e.error.is_some()) {
                print_warning(&format!(
                    "{}: {}",
                    entry.path,
                    entry.error.as_deref().unwrap_or_default()
                ));
            }
        }
    }

    Ok(())
}

pub async fn get_loaded_models(prober: &EndpointProber, format: OutputFormat) -> Result<()> {
    let models = prober.list_loaded_models().await;

    if let OutputFormat::Json = format {
        print_json(&models)?;
    }
    if let Some(error) = models.error {
        anyhow::bail!("Failed to list models: {}", error);
    }

    if let OutputFormat::Table = format {
        print_heading("Loaded Models");
        print_table(models.models.iter().map(ModelRow::from).collect());
        println!("\nTotal: {} models", models.count);
    }

    Ok(())
}

pub async fn model_info(
    prober: &EndpointProber,
    model_id: &str,
    format: OutputFormat,
) -> Result<()> {
    let info = prober.model_info(model_id).await;

    if let OutputFormat::Json = format {
        print_json(&info)?;
    }
    if let Some(error) = info.error {
        anyhow::bail!(error);
    }

    if let OutputFormat::Table = format {
        print_heading("Model Information");
        if let Some(model) = &info.model {
            print_table(vec![ModelRow::from(model)]);
        }
        if let Some(caps) = info.capabilities {
            println!();
            println!("{}", "Capabilities".bold());
            println!("{}", "-".repeat(60));
            println!("Chat completions: {}", color_available(caps.chat));
            println!("Completions:      {}", color_available(caps.completions));
            println!("Embeddings:       {}", color_available(caps.embeddings));
        }
    }

    Ok(())
}

pub async fn test_connection(prober: &EndpointProber, format: OutputFormat) -> Result<()> {
    let check = prober.test_connection().await;

    match format {
        OutputFormat::Json => print_json(&check)?,
        OutputFormat::Table => {
            if check.reachable {
                print_success(&format!(
                    "{} answered HTTP {} in {:.1} ms",
                    prober.base_url(),
                    check.status_code.unwrap_or_default(),
                    check.latency_ms.unwrap_or_default()
                ));
            } else {
                print_error(&format!("{} is not reachable", prober.base_url()));
            }
        }
    }

    if !check.reachable {
        anyhow::bail!(check
            .error
            .unwrap_or_else(|| "connection failed".to_string()));
    }
    Ok(())
}

pub async fn server_stats(prober: &EndpointProber, format: OutputFormat) -> Result<()> {
    let stats = prober.server_stats().await;

    if let OutputFormat::Json = format {
        print_json(&stats)?;
    }
    if let Some(error) = stats.error {
        anyhow::bail!(error);
    }

    if let OutputFormat::Table = format {
        let metrics = stats.metrics.unwrap_or_default();
        // Exposition comments are noise in a terminal
        let samples: Vec<&str> = metrics
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();

        print_heading("Server Metrics");
        print_info(&format!("{} samples from {}", samples.len(), prober.base_url()));
        for line in samples {
            println!("{}", line);
        }
    }

    Ok(())
}
