//! Gateway frames
//!
//! Builders for the server-side frames the tests feed the client.

use serde_json::{json, Value};

/// Gateway trace reported by HELLO, READY and RESUMED
pub const TRACE: &str = "gateway-test-1";

/// op 10
pub fn hello(heartbeat_interval_ms: u64) -> Value {
    json!({
        "op": 10,
        "d": {
            "heartbeat_interval": heartbeat_interval_ms,
            "_trace": [TRACE],
        }
    })
}

/// op 11
pub fn heartbeat_ack() -> Value {
    json!({"op": 11, "d": null})
}

/// op 1, sent by the server to ask for an immediate heartbeat
pub fn heartbeat_request() -> Value {
    json!({"op": 1, "d": null})
}

/// op 7
pub fn reconnect() -> Value {
    json!({"op": 7, "d": null})
}

/// op 9
pub fn invalid_session(resumable: bool) -> Value {
    json!({"op": 9, "d": resumable})
}

/// op 0 with an arbitrary event type
pub fn dispatch(event_type: &str, seq: u64, data: Value) -> Value {
    json!({"op": 0, "t": event_type, "s": seq, "d": data})
}

/// READY announcing `guild_ids` as unavailable
pub fn ready(session_id: &str, seq: u64, guild_ids: &[u64]) -> Value {
    let guilds: Vec<Value> = guild_ids
        .iter()
        .map(|id| json!({"id": id.to_string(), "unavailable": true}))
        .collect();

    dispatch(
        "READY",
        seq,
        json!({
            "v": 6,
            "session_id": session_id,
            "user": {"id": "1", "username": "tester", "bot": true},
            "guilds": guilds,
            "private_channels": [],
            "_trace": [TRACE],
        }),
    )
}

pub fn resumed(seq: u64) -> Value {
    dispatch("RESUMED", seq, json!({"_trace": [TRACE]}))
}

/// GUILD_CREATE with one text channel and no inline members
pub fn guild_create(guild_id: u64, seq: u64, member_count: u64) -> Value {
    dispatch(
        "GUILD_CREATE",
        seq,
        json!({
            "id": guild_id.to_string(),
            "name": format!("guild {guild_id}"),
            "member_count": member_count,
            "large": member_count > 250,
            "channels": [
                {"id": (guild_id * 10).to_string(), "type": 0, "name": "general"}
            ],
            "members": [],
        }),
    )
}

/// One GUILD_MEMBERS_CHUNK carrying users `first_user..first_user + count`
pub fn members_chunk(guild_id: u64, seq: u64, first_user: u64, count: u64) -> Value {
    let members: Vec<Value> = (first_user..first_user + count)
        .map(|id| json!({"user": {"id": id.to_string(), "username": format!("user{id}")}}))
        .collect();

    dispatch(
        "GUILD_MEMBERS_CHUNK",
        seq,
        json!({"guild_id": guild_id.to_string(), "members": members}),
    )
}

/// MESSAGE_CREATE in a private channel, tagged with `content`
pub fn message_create(seq: u64, content: &str) -> Value {
    dispatch(
        "MESSAGE_CREATE",
        seq,
        json!({
            "id": (1_000 + seq).to_string(),
            "channel_id": "500",
            "content": content,
        }),
    )
}
