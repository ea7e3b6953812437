//! Payload definitions for the frames the client builds or inspects

use chat_common::{GatewayConfig, IdentifyConfig};
use chat_core::Snowflake;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway protocol version sent with IDENTIFY
pub const GATEWAY_VERSION: u8 = 6;

/// Payload for op 10 (Hello)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,

    /// Gateway servers that handled the handshake
    #[serde(rename = "_trace", default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

impl HelloPayload {
    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self {
            heartbeat_interval,
            trace: Vec::new(),
        }
    }
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub v: u8,
    pub token: String,
    pub properties: IdentifyProperties,
    pub compress: bool,
    pub large_threshold: u32,
    pub presence: PresencePayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
}

impl IdentifyPayload {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            v: GATEWAY_VERSION,
            token: config.auth_token(),
            properties: IdentifyProperties::from(&config.identify),
            compress: config.compress,
            large_threshold: config.large_threshold,
            presence: PresencePayload::default(),
            shard: config.shard.map(|s| [s.shard_id, s.shard_count]),
        }
    }
}

/// Client connection properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    #[serde(rename = "$os")]
    pub os: String,
    #[serde(rename = "$browser")]
    pub browser: String,
    #[serde(rename = "$device")]
    pub device: String,
}

impl From<&IdentifyConfig> for IdentifyProperties {
    fn from(config: &IdentifyConfig) -> Self {
        Self {
            os: config.os.clone(),
            browser: config.browser.clone(),
            device: config.device.clone(),
        }
    }
}

/// Presence sent with IDENTIFY and op 3 (Status Update)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresencePayload {
    /// online, idle, dnd, invisible or offline
    pub status: String,
    /// Unix millis the client went idle
    pub since: Option<u64>,
    pub afk: bool,
    pub game: Option<Value>,
}

impl Default for PresencePayload {
    fn default() -> Self {
        Self {
            status: "online".to_string(),
            since: None,
            afk: false,
            game: None,
        }
    }
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    /// Last sequence number received
    pub seq: Option<u64>,
}

/// Payload for op 8 (Request Guild Members)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestGuildMembersPayload {
    pub guild_id: Snowflake,
    /// Username prefix; empty requests everyone
    pub query: String,
    /// 0 requests every member
    pub limit: u32,
}

impl RequestGuildMembersPayload {
    /// Request the full member list of a guild
    #[must_use]
    pub fn all(guild_id: Snowflake) -> Self {
        Self {
            guild_id,
            query: String::new(),
            limit: 0,
        }
    }
}
