//! # chat-common
//!
//! Shared utilities: environment configuration and telemetry.

pub mod config;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    AppConfig, AppSettings, ConfigError, Environment, GatewayConfig, IdentifyConfig, ShardInfo,
};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
