//! Typed field access on raw gateway documents.
//!
//! The client only inspects a handful of fields (`guild_id`, `session_id`,
//! `unavailable`, `members`, ...); everything else is passed through to the
//! entity builder untouched.

use crate::error::{PayloadError, PayloadResult};
use crate::value_objects::Snowflake;
use serde_json::Value;

pub trait JsonExt {
    /// Required field of any type
    fn field(&self, key: &str) -> PayloadResult<&Value>;

    fn str_field(&self, key: &str) -> PayloadResult<&str>;

    fn u64_field(&self, key: &str) -> PayloadResult<u64>;

    fn array_field(&self, key: &str) -> PayloadResult<&Vec<Value>>;

    fn snowflake_field(&self, key: &str) -> PayloadResult<Snowflake>;

    /// Optional boolean; absent or `null` reads as `None`
    fn opt_bool(&self, key: &str) -> PayloadResult<Option<bool>>;
}

impl JsonExt for Value {
    fn field(&self, key: &str) -> PayloadResult<&Value> {
        match self.get(key) {
            Some(Value::Null) | None => Err(PayloadError::missing(key)),
            Some(value) => Ok(value),
        }
    }

    fn str_field(&self, key: &str) -> PayloadResult<&str> {
        self.field(key)?
            .as_str()
            .ok_or_else(|| PayloadError::invalid_type(key, "string"))
    }

    fn u64_field(&self, key: &str) -> PayloadResult<u64> {
        self.field(key)?
            .as_u64()
            .ok_or_else(|| PayloadError::invalid_type(key, "unsigned integer"))
    }

    fn array_field(&self, key: &str) -> PayloadResult<&Vec<Value>> {
        self.field(key)?
            .as_array()
            .ok_or_else(|| PayloadError::invalid_type(key, "array"))
    }

    fn snowflake_field(&self, key: &str) -> PayloadResult<Snowflake> {
        match self.field(key)? {
            Value::String(s) => Snowflake::parse(s).map_err(|_| PayloadError::InvalidSnowflake {
                field: key.to_string(),
                value: s.clone(),
            }),
            Value::Number(n) => n
                .as_u64()
                .map(Snowflake::new)
                .ok_or_else(|| PayloadError::InvalidSnowflake {
                    field: key.to_string(),
                    value: n.to_string(),
                }),
            _ => Err(PayloadError::invalid_type(key, "snowflake")),
        }
    }

    fn opt_bool(&self, key: &str) -> PayloadResult<Option<bool>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(PayloadError::invalid_type(key, "boolean")),
        }
    }
}
