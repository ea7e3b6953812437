//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if one is present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub gateway: GatewayConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
    /// Log every gateway frame at `trace`
    #[serde(default)]
    pub log_frames: bool,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Gateway connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Bot token, sent as `Bot <token>` in IDENTIFY and RESUME
    pub token: String,
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// Member count above which the gateway omits offline members
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,
    #[serde(default)]
    pub compress: bool,
    /// When false, every disconnect is terminal
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    #[serde(default)]
    pub shard: Option<ShardInfo>,
    #[serde(default)]
    pub identify: IdentifyConfig,
}

impl GatewayConfig {
    /// Defaults for everything but the token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            url: default_gateway_url(),
            large_threshold: default_large_threshold(),
            compress: false,
            auto_reconnect: default_auto_reconnect(),
            shard: None,
            identify: IdentifyConfig::default(),
        }
    }

    /// Token in the form the gateway expects
    #[must_use]
    pub fn auth_token(&self) -> String {
        if self.token.starts_with("Bot ") {
            self.token.clone()
        } else {
            format!("Bot {}", self.token)
        }
    }
}

/// `[shard_id, shard_count]` pair sent with IDENTIFY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ShardInfo {
    pub shard_id: u32,
    pub shard_count: u32,
}

impl ShardInfo {
    pub fn new(shard_id: u32, shard_count: u32) -> Result<Self, ConfigError> {
        if shard_count == 0 || shard_id >= shard_count {
            return Err(ConfigError::InvalidValue(
                "GATEWAY_SHARD_ID",
                format!("shard {shard_id} out of range for {shard_count} shards"),
            ));
        }
        Ok(Self {
            shard_id,
            shard_count,
        })
    }
}

/// Connection properties reported in IDENTIFY (`$os`, `$browser`, `$device`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentifyConfig {
    #[serde(default = "default_os")]
    pub os: String,
    #[serde(default = "default_library_name")]
    pub browser: String,
    #[serde(default = "default_library_name")]
    pub device: String,
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            os: default_os(),
            browser: default_library_name(),
            device: default_library_name(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "chat-client".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg/?v=6&encoding=json".to_string()
}

fn default_large_threshold() -> u32 {
    250
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_os() -> String {
    env::consts::OS.to_string()
}

fn default_library_name() -> String {
    "chat-client".to_string()
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let shard = match (
            parse_var::<u32, _>(&lookup, "GATEWAY_SHARD_ID")?,
            parse_var::<u32, _>(&lookup, "GATEWAY_SHARD_COUNT")?,
        ) {
            (Some(id), Some(count)) => Some(ShardInfo::new(id, count)?),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingVar("GATEWAY_SHARD_COUNT")),
            (None, Some(_)) => return Err(ConfigError::MissingVar("GATEWAY_SHARD_ID")),
        };

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: lookup("APP_ENV")
                    .and_then(|s| Environment::parse(&s))
                    .unwrap_or_else(default_env),
                log_frames: parse_var(&lookup, "LOG_FRAMES")?.unwrap_or(false),
            },
            gateway: GatewayConfig {
                token: lookup("GATEWAY_TOKEN")
                    .filter(|s| !s.trim().is_empty())
                    .ok_or(ConfigError::MissingVar("GATEWAY_TOKEN"))?,
                url: lookup("GATEWAY_URL").unwrap_or_else(default_gateway_url),
                large_threshold: parse_var(&lookup, "GATEWAY_LARGE_THRESHOLD")?
                    .unwrap_or_else(default_large_threshold),
                compress: parse_var(&lookup, "GATEWAY_COMPRESS")?.unwrap_or(false),
                auto_reconnect: parse_var(&lookup, "GATEWAY_AUTO_RECONNECT")?
                    .unwrap_or_else(default_auto_reconnect),
                shard,
                identify: IdentifyConfig {
                    os: default_os(),
                    browser: lookup("GATEWAY_BROWSER").unwrap_or_else(default_library_name),
                    device: lookup("GATEWAY_DEVICE").unwrap_or_else(default_library_name),
                },
            },
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
