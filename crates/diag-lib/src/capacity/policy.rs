//! Capacity planning policy
//!
//! Known-model sizes, sizing coefficients and instance tiers. These are
//! tunable policy values rather than derived physics; a deployment may ship
//! its own table as JSON.

use crate::models::ModelSizeSource;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Weight plus activation overhead multiplier
pub const DEFAULT_WEIGHT_OVERHEAD_FACTOR: f64 = 1.2;

/// KV cache growth per unit of batch, in GB
pub const DEFAULT_KV_CACHE_GB_PER_BATCH: f64 = 0.5;

/// Fixed runtime overhead, in GB
pub const DEFAULT_RUNTIME_OVERHEAD_GB: f64 = 2.0;

/// Size assumed for models missing from the table, in GB
pub const DEFAULT_MODEL_SIZE_GB: f64 = 10.0;

/// A model identifier with its approximate serving size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownModel {
    pub name: String,
    pub size_gb: f64,
}

/// Instance classes suited to requirements up to `max_memory_gb` (inclusive)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceTier {
    /// `None` marks the unbounded top tier
    pub max_memory_gb: Option<f64>,
    pub instance_classes: Vec<String>,
}

impl InstanceTier {
    fn new(max_memory_gb: Option<f64>, classes: &[&str]) -> Self {
        Self {
            max_memory_gb,
            instance_classes: classes.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn admits(&self, requirement_gb: f64) -> bool {
        self.max_memory_gb
            .map(|max| requirement_gb <= max)
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityPolicy {
    /// Matched in declaration order
    pub known_models: Vec<KnownModel>,
    pub default_model_size_gb: f64,
    pub weight_overhead_factor: f64,
    pub kv_cache_gb_per_batch: f64,
    pub runtime_overhead_gb: f64,
    /// Ascending by `max_memory_gb`, ending with an unbounded tier
    pub instance_tiers: Vec<InstanceTier>,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        let known = [
            ("meta-llama/Llama-2-7b", 13.5),
            ("meta-llama/Llama-2-13b", 26.0),
            ("meta-llama/Llama-2-70b", 140.0),
            ("mistralai/Mistral-7B", 14.0),
            ("microsoft/DialoGPT-medium", 1.5),
            ("gpt2", 0.5),
            ("gpt2-medium", 1.5),
            ("gpt2-large", 3.0),
            ("gpt2-xl", 6.0),
        ];

        Self {
            known_models: known
                .iter()
                .map(|(name, size_gb)| KnownModel {
                    name: name.to_string(),
                    size_gb: *size_gb,
                })
                .collect(),
            default_model_size_gb: DEFAULT_MODEL_SIZE_GB,
            weight_overhead_factor: DEFAULT_WEIGHT_OVERHEAD_FACTOR,
            kv_cache_gb_per_batch: DEFAULT_KV_CACHE_GB_PER_BATCH,
            runtime_overhead_gb: DEFAULT_RUNTIME_OVERHEAD_GB,
            instance_tiers: vec![
                InstanceTier::new(Some(16.0), &["g4dn.xlarge", "g5.xlarge"]),
                InstanceTier::new(Some(24.0), &["g4dn.2xlarge", "g5.2xlarge"]),
                InstanceTier::new(Some(48.0), &["g5.4xlarge", "p3.2xlarge"]),
                InstanceTier::new(Some(80.0), &["g5.8xlarge", "p3.8xlarge", "p4d.xlarge"]),
                InstanceTier::new(None, &["p4d.24xlarge", "p5.48xlarge"]),
            ],
        }
    }
}

impl CapacityPolicy {
    /// Load a policy from a JSON file; omitted fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read capacity policy {}", path.display()))?;

        let policy: CapacityPolicy = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse capacity policy {}", path.display()))?;

        policy.validate()?;
        Ok(policy)
    }

    /// Check tier ordering and coefficient sanity
    pub fn validate(&self) -> Result<()> {
        let (last, bounded) = self
            .instance_tiers
            .split_last()
            .context("capacity policy needs at least one instance tier")?;
        if last.max_memory_gb.is_some() {
            anyhow::bail!("last instance tier must be unbounded");
        }

        let mut previous = f64::NEG_INFINITY;
        for tier in bounded {
            match tier.max_memory_gb {
                Some(max) if max > previous => previous = max,
                Some(max) => anyhow::bail!("instance tiers must ascend ({} after {})", max, previous),
                None => anyhow::bail!("only the last instance tier may be unbounded"),
            }
        }

        let coefficients = [
            self.default_model_size_gb,
            self.weight_overhead_factor,
            self.kv_cache_gb_per_batch,
            self.runtime_overhead_gb,
        ];
        if coefficients.iter().any(|c| !c.is_finite() || *c < 0.0) {
            anyhow::bail!("sizing coefficients must be finite and non-negative");
        }

        for known in &self.known_models {
            // An empty name would match every request
            if known.name.trim().is_empty() {
                anyhow::bail!("known model names must not be empty");
            }
            if !known.size_gb.is_finite() || known.size_gb < 0.0 {
                anyhow::bail!(
                    "size of known model '{}' must be finite and non-negative, got {}",
                    known.name,
                    known.size_gb
                );
            }
        }

        Ok(())
    }

    /// Look a model size up by fuzzy name match
    ///
    /// Case-insensitive substring containment in either direction; the first
    /// table entry that matches wins. Short names can match unintended
    /// entries (`gpt2-xl` hits `gpt2` first).
    pub fn resolve_model_size(&self, model_name: &str) -> (f64, ModelSizeSource) {
        let requested = model_name.to_lowercase();

        self.known_models
            .iter()
            .find(|known| {
                let known = known.name.to_lowercase();
                known.contains(&requested) || requested.contains(&known)
            })
            .map(|known| (known.size_gb, ModelSizeSource::Catalog))
            .unwrap_or((self.default_model_size_gb, ModelSizeSource::Default))
    }

    /// Memory needed to serve a model, in GB
    pub fn memory_requirement_gb(&self, model_size_gb: f64, batch_size: u32) -> f64 {
        model_size_gb * self.weight_overhead_factor
            + batch_size as f64 * self.kv_cache_gb_per_batch
            + self.runtime_overhead_gb
    }

    /// Instance classes for a requirement; boundaries fall in the lower tier
    pub fn instance_classes_for(&self, requirement_gb: f64) -> Vec<String> {
        self.instance_tiers
            .iter()
            .find(|tier| tier.admits(requirement_gb))
            .map(|tier| tier.instance_classes.clone())
            .unwrap_or_default()
    }
}
