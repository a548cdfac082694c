//! Core data models for the diagnostics engine
//!
//! Every type here is a transient result value: built once per request,
//! never mutated afterwards, and serialized as-is by the presentation layers.

use crate::error::TelemetryError;
use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Convert a byte count to fractional GiB, full precision
pub fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GIB
}

/// Round for presentation
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// Accelerator telemetry

/// One accelerator as reported by the management layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorDevice {
    pub index: u32,
    pub name: String,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub memory_free_bytes: u64,
    /// Compute utilization over the last sample period, 0..=100
    pub utilization_percent: u32,
    /// Memory controller activity over the last sample period, 0..=100
    pub memory_utilization_percent: u32,
    pub temperature_celsius: Option<u32>,
    pub power_watts_current: Option<f64>,
    pub power_watts_max: Option<f64>,
}

impl AcceleratorDevice {
    pub fn memory_total_gb(&self) -> f64 {
        bytes_to_gib(self.memory_total_bytes)
    }

    pub fn memory_used_gb(&self) -> f64 {
        bytes_to_gib(self.memory_used_bytes)
    }

    pub fn memory_free_gb(&self) -> f64 {
        bytes_to_gib(self.memory_free_bytes)
    }

    /// Share of device memory currently allocated
    pub fn memory_used_percent(&self) -> f64 {
        if self.memory_total_bytes == 0 {
            return 0.0;
        }
        self.memory_used_bytes as f64 / self.memory_total_bytes as f64 * 100.0
    }
}

/// All accelerators on the host, in device index order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorSnapshot {
    pub devices: Vec<AcceleratorDevice>,
    pub driver_version: String,
}

impl AcceleratorSnapshot {
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

/// Outcome of an accelerator read; the error arm is an expected outcome
pub type AcceleratorReading = Result<AcceleratorSnapshot, TelemetryError>;

/// Host CPU and memory counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    /// Absent when the platform does not expose core topology
    pub cpu_physical_cores: Option<usize>,
    pub cpu_logical_threads: usize,
    /// Absent on most virtualized hosts
    pub cpu_frequency_mhz: Option<u64>,
    pub mem_total_bytes: u64,
    pub mem_available_bytes: u64,
    pub mem_used_bytes: u64,
    pub mem_percent_used: f64,
    pub captured_at: DateTime<Utc>,
}

/// Combined accelerator + host view used for capacity planning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSpecs {
    pub gpu: Option<AcceleratorSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_error: Option<String>,
    pub host: HostSnapshot,
}

impl SystemSpecs {
    pub fn new(accelerators: AcceleratorReading, host: HostSnapshot) -> Self {
        match accelerators {
            Ok(snapshot) => Self {
                gpu: Some(snapshot),
                gpu_error: None,
                host,
            },
            Err(err) => Self {
                gpu: None,
                gpu_error: Some(err.to_string()),
                host,
            },
        }
    }
}

// Endpoint discovery

/// Probe outcome for a single catalog path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStatus {
    /// Carried as the map key when serialized
    #[serde(skip)]
    pub path: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Decoded body; only captured for the models listing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Path → status, kept in catalog order
///
/// Serialized as a JSON object keyed by path so existing consumers can index
/// it directly; the backing vector keeps display order deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointProbeResult {
    entries: Vec<EndpointStatus>,
}

impl EndpointProbeResult {
    pub fn new(entries: Vec<EndpointStatus>) -> Self {
        Self { entries }
    }

    pub fn get(&self, path: &str) -> Option<&EndpointStatus> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointStatus> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn available_count(&self) -> usize {
        self.entries.iter().filter(|e| e.available).count()
    }

    pub fn is_available(&self, path: &str) -> bool {
        self.get(path).map(|e| e.available).unwrap_or(false)
    }
}

impl Serialize for EndpointProbeResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.path, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EndpointProbeResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = EndpointProbeResult;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of endpoint path to probe status")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((path, mut status)) = access.next_entry::<String, EndpointStatus>()? {
                    status.path = path;
                    entries.push(status);
                }
                Ok(EndpointProbeResult { entries })
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSummary {
    pub total_endpoints: usize,
    pub available_endpoints: usize,
}

/// Full result of one probing pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointProbeReport {
    pub base_url: String,
    pub endpoints: EndpointProbeResult,
    pub summary: ProbeSummary,
}

/// Result of a single health-path round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionCheck {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry of an OpenAI-style `/v1/models` listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_model_len: Option<u64>,
    /// Server-specific fields we do not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ModelCard {
    /// Typed view of one listing entry; an entry whose known fields have
    /// unexpected types is kept with its raw fields only
    pub fn from_entry(entry: serde_json::Value) -> Self {
        if let Ok(card) = serde_json::from_value::<ModelCard>(entry.clone()) {
            return card;
        }
        let extra = match entry {
            serde_json::Value::Object(fields) => fields,
            other => {
                let mut fields = serde_json::Map::new();
                fields.insert("value".to_string(), other);
                fields
            }
        };
        Self {
            id: None,
            object: None,
            created: None,
            owned_by: None,
            max_model_len: None,
            extra,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedModels {
    pub success: bool,
    pub models: Vec<ModelCard>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoadedModels {
    pub fn loaded(models: Vec<ModelCard>) -> Self {
        let count = models.len();
        Self {
            success: true,
            models,
            count,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            models: Vec::new(),
            count: 0,
            error: Some(error.into()),
        }
    }
}

/// Serving capabilities inferred from which catalog paths answered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub chat: bool,
    pub completions: bool,
    pub embeddings: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<ModelCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelInfo {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            model: None,
            capabilities: None,
            error: Some(error.into()),
        }
    }
}

/// Raw Prometheus exposition from the inference server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    pub success: bool,
    pub metrics_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// Capacity planning

fn default_batch_size() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityRequest {
    pub model_name: String,
    /// When absent the size is looked up from the known-model table
    #[serde(default)]
    pub model_size_gb: Option<f64>,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl CapacityRequest {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_size_gb: None,
            batch_size: default_batch_size(),
        }
    }

    pub fn with_model_size_gb(mut self, size: f64) -> Self {
        self.model_size_gb = Some(size);
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Where the model size used for an estimate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSizeSource {
    Supplied,
    Catalog,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAnalysis {
    pub device_name: String,
    pub memory_gb: f64,
    pub estimated_usage_percent: f64,
    pub suitable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityRecommendation {
    pub model_name: String,
    pub model_size_gb: f64,
    pub model_size_source: ModelSizeSource,
    pub batch_size: u32,
    pub estimated_memory_requirement_gb: f64,
    pub current_system_suitable: bool,
    pub per_device_analysis: Vec<DeviceAnalysis>,
    pub suggested_instance_classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry_error: Option<String>,
}
