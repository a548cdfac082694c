//! CLI subcommand implementations

pub mod capacity;
pub mod endpoints;
pub mod system;
