//! Gateway frame format
//!
//! Every frame is `{op, t?, s?, d}`. Inbound frames keep `op` as a raw
//! integer so that unknown codes survive decoding.

use super::{
    HelloPayload, IdentifyPayload, OpCode, RequestGuildMembersPayload, ResumePayload,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Raw operation code
    pub op: u8,

    /// Event type (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event data payload; always serialized, `null` when absent
    #[serde(default)]
    pub d: Value,
}

impl GatewayMessage {
    fn new(op: OpCode, d: Value) -> Self {
        Self {
            op: op.as_u8(),
            t: None,
            s: None,
            d,
        }
    }

    /// Decoded op code, `None` for codes this client does not know
    #[must_use]
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_u8(self.op)
    }

    // === Client Messages ===

    /// Heartbeat (op=1) carrying the last sequence seen
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, last_sequence.map_or(Value::Null, Value::from))
    }

    /// Identify (op=2)
    pub fn identify(payload: &IdentifyPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(OpCode::Identify, serde_json::to_value(payload)?))
    }

    /// Resume (op=6)
    pub fn resume(payload: &ResumePayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(OpCode::Resume, serde_json::to_value(payload)?))
    }

    /// Request Guild Members (op=8)
    pub fn request_guild_members(
        payload: &RequestGuildMembersPayload,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            OpCode::RequestGuildMembers,
            serde_json::to_value(payload)?,
        ))
    }

    // === Parsing Server Messages ===

    /// Try to parse as a Hello payload (op=10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        if self.opcode() != Some(OpCode::Hello) {
            return None;
        }
        serde_json::from_value(self.d.clone()).ok()
    }

    /// Resumable flag of an Invalid Session frame (op=9)
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.opcode() != Some(OpCode::InvalidSession) {
            return None;
        }
        Some(self.d.as_bool().unwrap_or(false))
    }

    // === Utilities ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.opcode() {
            Some(op) => write!(f, "GatewayMessage(op={op}")?,
            None => write!(f, "GatewayMessage(op={} unknown", self.op)?,
        }
        if let Some(t) = &self.t {
            write!(f, ", t={t}")?;
        }
        if let Some(s) = self.s {
            write!(f, ", s={s}")?;
        }
        write!(f, ")")
    }
}
