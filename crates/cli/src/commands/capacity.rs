//! Capacity planning CLI command

use anyhow::Result;
use colored::Colorize;
use diag_lib::{CapacityPolicy, CapacityRequest, ModelSizeSource, TelemetryReader};
use tabled::Tabled;

use crate::output::{
    color_percent, color_suitable, format_gb, print_heading, print_info, print_json,
    print_success, print_table, print_warning, OutputFormat,
};

/// Row for per-device analysis table
#[derive(Tabled)]
struct DeviceAnalysisRow {
    #[tabled(rename = "Device")]
    device_name: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Est. Usage")]
    usage: String,
    #[tabled(rename = "Suitable")]
    suitable: String,
}

/// Estimate capacity for a model against local accelerators
pub fn check_capacity(
    policy: &CapacityPolicy,
    request: &CapacityRequest,
    format: OutputFormat,
) -> Result<()> {
    let reader = TelemetryReader::from_nvml();
    let reading = reader.read_accelerators();
    reader.shutdown();

    let rec = policy.estimate(request, reading.as_ref());

    match format {
        OutputFormat::Json => print_json(&rec)?,
        OutputFormat::Table => {
            print_heading("Capacity Estimate");
            println!("Model:            {}", rec.model_name.cyan());
            println!(
                "Model Size:       {} ({})",
                format_gb(rec.model_size_gb),
                match rec.model_size_source {
                    ModelSizeSource::Supplied => "supplied",
                    ModelSizeSource::Catalog => "known model",
                    ModelSizeSource::Default => "default",
                }
            );
            println!("Batch Size:       {}", rec.batch_size);
            println!(
                "Estimated Need:   {}",
                format_gb(rec.estimated_memory_requirement_gb).bold()
            );
            println!();

            if rec.model_size_source == ModelSizeSource::Default {
                print_warning(&format!(
                    "'{}' is not a known model; assumed {}. Pass --model-size-gb for a better estimate",
                    rec.model_name,
                    format_gb(rec.model_size_gb)
                ));
            }

            match &rec.telemetry_error {
                Some(error) => print_warning(&format!("No local accelerators analyzed: {}", error)),
                None => {
                    let rows: Vec<DeviceAnalysisRow> = rec
                        .per_device_analysis
                        .iter()
                        .map(|d| DeviceAnalysisRow {
                            device_name: d.device_name.clone(),
                            memory: format_gb(d.memory_gb),
                            usage: color_percent(d.estimated_usage_percent),
                            suitable: color_suitable(d.suitable),
                        })
                        .collect();
                    print_table(rows);
                }
            }

            if rec.current_system_suitable {
                print_success("This system can serve the model");
            } else {
                print_warning("This system cannot serve the model as configured");
            }
            print_info(&format!(
                "Suggested instance classes: {}",
                rec.suggested_instance_classes.join(", ")
            ));
        }
    }

    Ok(())
}
