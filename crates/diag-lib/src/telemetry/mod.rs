//! Hardware telemetry collection
//!
//! Reads accelerator state through an [`AcceleratorBackend`] (NVML in
//! production) and host CPU/memory counters through sysinfo. A missing or
//! broken management layer is an ordinary outcome: the reader hands back a
//! [`TelemetryError`] instead of failing the caller.

mod host;
mod nvml;

#[cfg(test)]
mod tests;

pub use host::read_host;
pub use nvml::NvmlBackend;

use crate::error::TelemetryError;
use crate::models::{AcceleratorDevice, AcceleratorReading, AcceleratorSnapshot, HostSnapshot, SystemSpecs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Raw memory counters for one device, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Raw utilization counters for one device, in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtilizationReading {
    pub gpu: u32,
    pub memory: u32,
}

/// Trait for accelerator management layer implementations
///
/// Every query is independent so a failure in one field never blocks the
/// others. Implementations must be cheap to call repeatedly.
pub trait AcceleratorBackend: Send + Sync {
    fn driver_version(&self) -> Result<String, TelemetryError>;

    fn device_count(&self) -> Result<u32, TelemetryError>;

    fn device_name(&self, index: u32) -> Result<String, TelemetryError>;

    fn memory(&self, index: u32) -> Result<MemoryReading, TelemetryError>;

    fn utilization(&self, index: u32) -> Result<UtilizationReading, TelemetryError>;

    fn temperature_celsius(&self, index: u32) -> Result<u32, TelemetryError>;

    fn power_usage_milliwatts(&self, index: u32) -> Result<u32, TelemetryError>;

    fn power_limit_milliwatts(&self, index: u32) -> Result<u32, TelemetryError>;

    /// Release the management layer
    fn shutdown(self) -> Result<(), TelemetryError>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Telemetry reader bound to an explicitly initialized backend
///
/// The backend handle is acquired by the caller (see [`NvmlBackend::init`])
/// and released with [`TelemetryReader::shutdown`]; the reader itself holds
/// no per-request state.
pub struct TelemetryReader<B> {
    backend: Result<B, TelemetryError>,
}

impl TelemetryReader<NvmlBackend> {
    /// Initialize NVML and wrap it; never fails
    pub fn from_nvml() -> Self {
        Self::new(NvmlBackend::init())
    }
}

impl<B: AcceleratorBackend> TelemetryReader<B> {
    pub fn new(backend: Result<B, TelemetryError>) -> Self {
        if let Err(err) = &backend {
            warn!(error = %err, "Accelerator telemetry disabled");
        }
        Self { backend }
    }

    /// Whether a backend was initialized
    pub fn is_available(&self) -> bool {
        self.backend.is_ok()
    }

    /// Why the backend is unusable, if it is
    pub fn unavailable_reason(&self) -> Option<&TelemetryError> {
        self.backend.as_ref().err()
    }

    /// Snapshot every accelerator
    pub fn read_accelerators(&self) -> AcceleratorReading {
        let backend = self.backend.as_ref().map_err(|e| e.clone())?;

        let count = backend.device_count()?;
        if count == 0 {
            return Err(TelemetryError::unavailable("no accelerator devices found"));
        }
        let driver_version = backend.driver_version()?;

        let devices = (0..count)
            .map(|index| Self::read_device(backend, index))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(device_count = devices.len(), driver = %driver_version, "Read accelerator snapshot");

        Ok(AcceleratorSnapshot {
            devices,
            driver_version,
        })
    }

    fn read_device(backend: &B, index: u32) -> Result<AcceleratorDevice, TelemetryError> {
        let name = backend.device_name(index)?;
        let memory = backend.memory(index)?;
        let utilization = backend.utilization(index)?;

        // Some drivers report reserved memory outside used/free
        let memory_used_bytes = memory.used.min(memory.total);
        let memory_free_bytes = memory.total - memory_used_bytes;

        let temperature_celsius = optional(backend.temperature_celsius(index));
        let power_watts_current = optional(backend.power_usage_milliwatts(index)).map(milliwatts_to_watts);
        let power_watts_max = optional(backend.power_limit_milliwatts(index)).map(milliwatts_to_watts);

        Ok(AcceleratorDevice {
            index,
            name,
            memory_total_bytes: memory.total,
            memory_used_bytes,
            memory_free_bytes,
            utilization_percent: utilization.gpu.min(100),
            memory_utilization_percent: utilization.memory.min(100),
            temperature_celsius,
            power_watts_current,
            power_watts_max,
        })
    }

    /// Host counters; never fails, individual fields may be absent
    pub fn read_host(&self) -> HostSnapshot {
        read_host()
    }

    /// Accelerator and host state together
    pub fn read_system_specs(&self) -> SystemSpecs {
        SystemSpecs::new(self.read_accelerators(), self.read_host())
    }

    /// Release the backend
    pub fn shutdown(self) {
        if let Ok(backend) = self.backend {
            match backend.shutdown() {
                Ok(()) => info!("Accelerator telemetry shut down"),
                Err(err) => warn!(error = %err, "Accelerator telemetry shutdown failed"),
            }
        }
    }
}

impl<B: AcceleratorBackend + 'static> TelemetryReader<B> {
    /// Read accelerators off the async runtime, bounded by `timeout`
    pub async fn read_accelerators_within(self: Arc<Self>, timeout: Duration) -> AcceleratorReading {
        let task = tokio::task::spawn_blocking(move || self.read_accelerators());

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(reading)) => reading,
            Ok(Err(join_err)) => Err(TelemetryError::unavailable(format!(
                "telemetry task failed: {}",
                join_err
            ))),
            Err(_) => Err(TelemetryError::TimedOut {
                after_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

/// Degrade an optional reading to absent
fn optional<T>(reading: Result<T, TelemetryError>) -> Option<T> {
    match reading {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(error = %err, "Optional accelerator reading unavailable");
            None
        }
    }
}

fn milliwatts_to_watts(milliwatts: u32) -> f64 {
    milliwatts as f64 / 1000.0
}
