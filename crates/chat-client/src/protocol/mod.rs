//! Gateway protocol definitions
//!
//! Op codes, frame format, payloads and close codes.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{
    classify, CloseCode, CloseDisposition, ABNORMAL_CLOSURE, INVALIDATE_SESSION_REASON,
};
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    HelloPayload, IdentifyPayload, IdentifyProperties, PresencePayload, RequestGuildMembersPayload,
    ResumePayload, GATEWAY_VERSION,
};
