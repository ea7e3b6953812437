//! Tracing and logging setup
//!
//! The client logs raw gateway frames at `trace` and protocol steps at
//! `debug`. Frame logging is noisy, so it is opted into separately from the
//! base level. `RUST_LOG`, when set, overrides both.

use crate::config::Environment;
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::Registry, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Crate whose `trace` output carries raw frames
const FRAME_TARGET: &str = "chat_client";

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for everything not covered by `log_frames`
    pub level: Level,
    /// Emit newline-delimited JSON instead of human-readable lines
    pub json: bool,
    /// Log every frame sent and received
    pub log_frames: bool,
    pub file_line: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            log_frames: false,
            file_line: true,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            json: true,
            log_frames: false,
            file_line: false,
        }
    }

    #[must_use]
    pub fn for_environment(env: Environment) -> Self {
        match env {
            Environment::Development => Self::development(),
            Environment::Staging => Self::default(),
            Environment::Production => Self::production(),
        }
    }

    #[must_use]
    pub fn with_frames(mut self) -> Self {
        self.log_frames = true;
        self
    }

    /// Filter directives used when `RUST_LOG` is unset
    pub fn directives(&self) -> String {
        let base = self.level.as_str().to_ascii_lowercase();
        if self.log_frames {
            format!("{base},{FRAME_TARGET}=trace")
        } else {
            base
        }
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_target(true)
            .with_file(self.file_line)
            .with_line_number(self.file_line);

        if self.json {
            layer.json().flatten_event(true).boxed()
        } else {
            layer.boxed()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
    }
}

/// Install the global subscriber with the default configuration
pub fn try_init_tracing() -> Result<(), TracingError> {
    try_init_tracing_with_config(TracingConfig::default())
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed; the existing one stays.
pub fn try_init_tracing_with_config(config: TracingConfig) -> Result<(), TracingError> {
    tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(config.env_filter())
        .try_init()
        .map_err(|_| TracingError::AlreadyInitialized)
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Tracing subscriber already initialized")]
    AlreadyInitialized,
}
