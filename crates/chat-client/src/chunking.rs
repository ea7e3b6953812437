//! Member-chunk aggregator
//!
//! Large guilds arrive without their member list. The client asks for it
//! (op 8) and the gateway answers with a series of GUILD_MEMBERS_CHUNK
//! dispatches. Fragments are collected per guild until their combined size
//! reaches the expected member count, then handed off together.

use chat_core::Snowflake;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct ChunkEntry {
    expected: i64,
    received: i64,
    fragments: Vec<Vec<Value>>,
}

/// Result of adding one fragment
#[derive(Debug, PartialEq)]
pub enum ChunkProgress {
    /// More members are expected
    Pending { received: i64, expected: i64 },
    /// The guild is complete; its entry has been removed
    Complete(Vec<Vec<Value>>),
    /// No entry for this guild
    Untracked,
}

#[derive(Debug, Default)]
pub struct MemberChunkAggregator {
    entries: Mutex<HashMap<Snowflake, ChunkEntry>>,
}

impl MemberChunkAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a guild, replacing any existing entry
    pub fn set_expected(&self, guild_id: Snowflake, expected: i64) {
        let previous = self.entries.lock().insert(
            guild_id,
            ChunkEntry {
                expected,
                ..ChunkEntry::default()
            },
        );

        if let Some(previous) = previous {
            tracing::warn!(
                guild_id = %guild_id,
                previous_expected = previous.expected,
                dropped_fragments = previous.fragments.len(),
                "Expected member count set for a guild that was already chunking"
            );
        }
    }

    /// Shift the expected count of a tracked guild (member joined or left).
    ///
    /// Does nothing for guilds that are not being chunked.
    pub fn adjust_expected(&self, guild_id: Snowflake, delta: i64) {
        if let Some(entry) = self.entries.lock().get_mut(&guild_id) {
            entry.expected += delta;
        }
    }

    /// Append a fragment. Completion check and removal happen under one lock.
    pub fn add_fragment(&self, guild_id: Snowflake, members: Vec<Value>) -> ChunkProgress {
        let mut entries = self.entries.lock();

        let Some(entry) = entries.get_mut(&guild_id) else {
            return ChunkProgress::Untracked;
        };

        entry.received += i64::try_from(members.len()).unwrap_or(i64::MAX);
        entry.fragments.push(members);

        tracing::debug!(
            guild_id = %guild_id,
            received = entry.received,
            expected = entry.expected,
            "Member chunk received"
        );

        if entry.received < entry.expected {
            return ChunkProgress::Pending {
                received: entry.received,
                expected: entry.expected,
            };
        }

        match entries.remove(&guild_id) {
            Some(entry) => ChunkProgress::Complete(entry.fragments),
            None => ChunkProgress::Untracked,
        }
    }

    pub fn is_tracking(&self, guild_id: Snowflake) -> bool {
        self.entries.lock().contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
