//! Configuration types for the integration runtime.

pub mod config;

pub use config::{ConfigError, IntegrationConfig};
