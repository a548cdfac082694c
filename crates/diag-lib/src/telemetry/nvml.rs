//! NVML (NVIDIA Management Library) backend

use super::{AcceleratorBackend, MemoryReading, UtilizationReading};
use crate::error::TelemetryError;
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::{Device, Nvml};
use tracing::info;

/// Handle to an initialized NVML library
///
/// NVML is loaded dynamically, so a host without the NVIDIA driver simply
/// fails [`NvmlBackend::init`].
pub struct NvmlBackend {
    nvml: Nvml,
}

impl NvmlBackend {
    /// Load and initialize NVML
    pub fn init() -> Result<Self, TelemetryError> {
        let nvml = Nvml::init().map_err(|e| {
            TelemetryError::unavailable(format!("NVML not available or failed to initialize: {}", e))
        })?;

        info!("NVML initialized");
        Ok(Self { nvml })
    }

    fn device(&self, index: u32) -> Result<Device<'_>, TelemetryError> {
        self.nvml
            .device_by_index(index)
            .map_err(|e| TelemetryError::query(index, "handle", e))
    }
}

impl AcceleratorBackend for NvmlBackend {
    fn driver_version(&self) -> Result<String, TelemetryError> {
        self.nvml
            .sys_driver_version()
            .map_err(|e| TelemetryError::unavailable(format!("failed to read driver version: {}", e)))
    }

    fn device_count(&self) -> Result<u32, TelemetryError> {
        self.nvml
            .device_count()
            .map_err(|e| TelemetryError::unavailable(format!("failed to count devices: {}", e)))
    }

    fn device_name(&self, index: u32) -> Result<String, TelemetryError> {
        self.device(index)?
            .name()
            .map_err(|e| TelemetryError::query(index, "name", e))
    }

    fn memory(&self, index: u32) -> Result<MemoryReading, TelemetryError> {
        let info = self
            .device(index)?
            .memory_info()
            .map_err(|e| TelemetryError::query(index, "memory", e))?;

        Ok(MemoryReading {
            total: info.total,
            used: info.used,
            free: info.free,
        })
    }

    fn utilization(&self, index: u32) -> Result<UtilizationReading, TelemetryError> {
        let rates = self
            .device(index)?
            .utilization_rates()
            .map_err(|e| TelemetryError::query(index, "utilization", e))?;

        Ok(UtilizationReading {
            gpu: rates.gpu,
            memory: rates.memory,
        })
    }

    fn temperature_celsius(&self, index: u32) -> Result<u32, TelemetryError> {
        self.device(index)?
            .temperature(TemperatureSensor::Gpu)
            .map_err(|e| TelemetryError::query(index, "temperature", e))
    }

    fn power_usage_milliwatts(&self, index: u32) -> Result<u32, TelemetryError> {
        self.device(index)?
            .power_usage()
            .map_err(|e| TelemetryError::query(index, "power_usage", e))
    }

    fn power_limit_milliwatts(&self, index: u32) -> Result<u32, TelemetryError> {
        self.device(index)?
            .power_management_limit()
            .map_err(|e| TelemetryError::query(index, "power_limit", e))
    }

    fn shutdown(self) -> Result<(), TelemetryError> {
        self.nvml
            .shutdown()
            .map_err(|e| TelemetryError::unavailable(format!("NVML shutdown failed: {}", e)))
    }
}
