//! Error types for the diagnostics engine
//!
//! None of these escape an engine operation as a failure of the call itself.
//! They are caught where they originate and folded into result values.

use thiserror::Error;

/// Failure to obtain accelerator telemetry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    /// The management layer (driver, library, permissions) is not usable
    #[error("accelerator management layer unavailable: {reason}")]
    Unavailable { reason: String },

    /// A single device query failed
    #[error("failed to read {field} for device {index}: {reason}")]
    Query {
        index: u32,
        field: &'static str,
        reason: String,
    },

    /// The management layer did not answer in time
    #[error("accelerator query timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },
}

impl TelemetryError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn query(index: u32, field: &'static str, reason: impl ToString) -> Self {
        Self::Query {
            index,
            field,
            reason: reason.to_string(),
        }
    }
}

/// Failure talking to a remote inference server
#[derive(Debug, Error)]
pub enum ProbeError {
    /// DNS, connect, TLS or timeout failure
    #[error("endpoint unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The body was not the JSON shape we expected
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid base URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        ProbeError::MalformedResponse(err.to_string())
    }
}
