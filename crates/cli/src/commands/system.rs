//! Local hardware CLI commands

use anyhow::Result;
use colored::Colorize;
use diag_lib::{AcceleratorDevice, HostSnapshot, TelemetryReader};
use tabled::Tabled;

use crate::output::{
    color_percent, format_bytes, format_gb, format_optional, print_heading, print_json,
    print_table, print_warning, OutputFormat,
};

/// Row for accelerator specification table
#[derive(Tabled)]
struct DeviceSpecRow {
    #[tabled(rename = "#")]
    index: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Total")]
    memory_total: String,
    #[tabled(rename = "Used")]
    memory_used: String,
    #[tabled(rename = "Free")]
    memory_free: String,
    #[tabled(rename = "Temp")]
    temperature: String,
    #[tabled(rename = "Power Limit")]
    power_max: String,
}

/// Row for accelerator utilization table
#[derive(Tabled)]
struct UtilizationRow {
    #[tabled(rename = "#")]
    index: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "GPU Util")]
    utilization: String,
    #[tabled(rename = "Mem Activity")]
    memory_activity: String,
    #[tabled(rename = "Mem Used")]
    memory_used: String,
    #[tabled(rename = "Temp")]
    temperature: String,
    #[tabled(rename = "Power")]
    power: String,
}

impl From<&AcceleratorDevice> for DeviceSpecRow {
    fn from(device: &AcceleratorDevice) -> Self {
        Self {
            index: device.index,
            name: device.name.clone(),
            memory_total: format_gb(device.memory_total_gb()),
            memory_used: format_gb(device.memory_used_gb()),
            memory_free: format_gb(device.memory_free_gb()),
            temperature: format_optional(device.temperature_celsius, "°C"),
            power_max: format_optional(device.power_watts_max.map(|w| format!("{:.0}", w)), " W"),
        }
    }
}

impl From<&AcceleratorDevice> for UtilizationRow {
    fn from(device: &AcceleratorDevice) -> Self {
        Self {
            index: device.index,
            name: device.name.clone(),
            utilization: color_percent(device.utilization_percent as f64),
            memory_activity: format!("{}%", device.memory_utilization_percent),
            memory_used: format!(
                "{} / {} ({})",
                format_gb(device.memory_used_gb()),
                format_gb(device.memory_total_gb()),
                color_percent(device.memory_used_percent())
            ),
            temperature: format_optional(device.temperature_celsius, "°C"),
            power: match (device.power_watts_current, device.power_watts_max) {
                (Some(now), Some(max)) => format!("{:.1} / {:.0} W", now, max),
                (Some(now), None) => format!("{:.1} W", now),
                _ => format_optional::<f64>(None, ""),
            },
        }
    }
}

/// Show accelerator and host specifications
pub fn get_system_specs(format: OutputFormat) -> Result<()> {
    let reader = TelemetryReader::from_nvml();
    let specs = reader.read_system_specs();
    reader.shutdown();

    match format {
        OutputFormat::Json => print_json(&specs)?,
        OutputFormat::Table => {
            print_heading("System Specifications");
            print_host(&specs.host);
            println!();

            println!("{}", "Accelerators".bold());
            println!("{}", "-".repeat(60));
            match (&specs.gpu, &specs.gpu_error) {
                (Some(gpu), _) => {
                    println!("Driver:           {}", gpu.driver_version.cyan());
                    println!("Devices:          {}", gpu.device_count());
                    print_table(gpu.devices.iter().map(DeviceSpecRow::from).collect());
                }
                (None, error) => {
                    print_warning(&format!(
                        "No accelerator telemetry: {}",
                        error.as_deref().unwrap_or("unknown reason")
                    ));
                }
            }
        }
    }

    Ok(())
}

fn print_host(host: &HostSnapshot) {
    println!("{}", "Host".bold());
    println!("{}", "-".repeat(60));
    println!(
        "CPU:              {} physical cores, {} threads",
        format_optional(host.cpu_physical_cores, ""),
        host.cpu_logical_threads
    );
    println!(
        "CPU Frequency:    {}",
        format_optional(host.cpu_frequency_mhz, " MHz")
    );
    println!(
        "Memory:           {} total, {} available ({} used)",
        format_bytes(host.mem_total_bytes),
        format_bytes(host.mem_available_bytes),
        color_percent(host.mem_percent_used)
    );
}

/// Show current accelerator utilization
pub fn gpu_utilization(format: OutputFormat) -> Result<()> {
    let reader = TelemetryReader::from_nvml();
    let reading = reader.read_accelerators();
    reader.shutdown();

    let snapshot = match reading {
        Ok(snapshot) => snapshot,
        Err(err) => {
            if let OutputFormat::Json = format {
                print_json(&serde_json::json!({ "error": err.to_string() }))?;
            }
            anyhow::bail!(err);
        }
    };

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => {
            print_heading("Accelerator Utilization");
            print_table(snapshot.devices.iter().map(UtilizationRow::from).collect());
        }
    }

    Ok(())
}
