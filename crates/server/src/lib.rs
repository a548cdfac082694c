//! vLLM diagnostics HTTP service

pub mod api;
pub mod config;
