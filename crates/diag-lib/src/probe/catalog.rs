//! Conventional API surface of an OpenAI-compatible inference server

use serde::{Deserialize, Serialize};

pub const MODELS_PATH: &str = "/v1/models";
pub const COMPLETIONS_PATH: &str = "/v1/completions";
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const EMBEDDINGS_PATH: &str = "/v1/embeddings";
pub const HEALTH_PATH: &str = "/health";
pub const METRICS_PATH: &str = "/metrics";
pub const VERSION_PATH: &str = "/version";

/// One candidate path to probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub path: String,
    pub description: String,
    /// Attach the decoded JSON body to the result on HTTP 200
    #[serde(default)]
    pub capture_payload: bool,
}

impl CatalogEntry {
    pub fn new(path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
            capture_payload: false,
        }
    }

    pub fn capturing_payload(mut self) -> Self {
        self.capture_payload = true;
        self
    }
}

/// The default catalog, in display order
pub fn default_catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new(MODELS_PATH, "List available models").capturing_payload(),
        CatalogEntry::new(COMPLETIONS_PATH, "Text completion endpoint"),
        CatalogEntry::new(CHAT_COMPLETIONS_PATH, "Chat completion endpoint"),
        CatalogEntry::new(EMBEDDINGS_PATH, "Text embeddings endpoint"),
        CatalogEntry::new(HEALTH_PATH, "Health check endpoint"),
        CatalogEntry::new(METRICS_PATH, "Prometheus metrics endpoint"),
        CatalogEntry::new(VERSION_PATH, "vLLM version information"),
    ]
}
