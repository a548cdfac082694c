//! Capacity estimation
//!
//! A pure function of the request, the policy and an accelerator reading.
//! Identical inputs always produce an identical recommendation.

mod policy;

pub use policy::{
    CapacityPolicy, InstanceTier, KnownModel, DEFAULT_KV_CACHE_GB_PER_BATCH,
    DEFAULT_MODEL_SIZE_GB, DEFAULT_RUNTIME_OVERHEAD_GB, DEFAULT_WEIGHT_OVERHEAD_FACTOR,
};

use crate::error::TelemetryError;
use crate::models::{
    round_to, AcceleratorSnapshot, CapacityRecommendation, CapacityRequest, DeviceAnalysis,
    ModelSizeSource,
};
use tracing::debug;

/// Estimate with the built-in policy
pub fn estimate(
    request: &CapacityRequest,
    accelerators: Result<&AcceleratorSnapshot, &TelemetryError>,
) -> CapacityRecommendation {
    CapacityPolicy::default().estimate(request, accelerators)
}

impl CapacityPolicy {
    /// Size a model against the current accelerators
    pub fn estimate(
        &self,
        request: &CapacityRequest,
        accelerators: Result<&AcceleratorSnapshot, &TelemetryError>,
    ) -> CapacityRecommendation {
        let (model_size_gb, model_size_source) = match request.model_size_gb {
            Some(size) => (size, ModelSizeSource::Supplied),
            None => self.resolve_model_size(&request.model_name),
        };

        let requirement_gb = self.memory_requirement_gb(model_size_gb, request.batch_size);
        let suggested_instance_classes = self.instance_classes_for(requirement_gb);

        let (per_device_analysis, telemetry_error) = match accelerators {
            Ok(snapshot) => (analyze_devices(snapshot, requirement_gb), None),
            Err(err) => (Vec::new(), Some(err.to_string())),
        };
        let current_system_suitable = per_device_analysis.iter().any(|d| d.suitable);

        debug!(
            model = %request.model_name,
            model_size_gb,
            source = ?model_size_source,
            requirement_gb,
            suitable = current_system_suitable,
            "Estimated capacity"
        );

        CapacityRecommendation {
            model_name: request.model_name.clone(),
            model_size_gb,
            model_size_source,
            batch_size: request.batch_size,
            estimated_memory_requirement_gb: requirement_gb,
            current_system_suitable,
            per_device_analysis,
            suggested_instance_classes,
            telemetry_error,
        }
    }
}

fn analyze_devices(snapshot: &AcceleratorSnapshot, requirement_gb: f64) -> Vec<DeviceAnalysis> {
    snapshot
        .devices
        .iter()
        .map(|device| {
            let memory_gb = device.memory_total_gb();
            let estimated_usage_percent = if memory_gb > 0.0 {
                round_to(requirement_gb / memory_gb * 100.0, 1)
            } else {
                0.0
            };

            DeviceAnalysis {
                device_name: device.name.clone(),
                memory_gb: round_to(memory_gb, 2),
                estimated_usage_percent,
                suitable: memory_gb > 0.0 && memory_gb >= requirement_gb,
            }
        })
        .collect()
}
