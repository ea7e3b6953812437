//! Payload decode errors
//!
//! Raised when a gateway payload lacks a field the client inspects, or carries
//! it with the wrong JSON type. These never tear a connection down; the
//! dispatch path logs them per event and moves on.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("field `{field}` is not a {expected}")]
    InvalidType {
        field: String,
        expected: &'static str,
    },

    #[error("field `{field}` is not a valid snowflake: {value}")]
    InvalidSnowflake { field: String, value: String },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl PayloadError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    pub fn invalid_type(field: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidType {
            field: field.into(),
            expected,
        }
    }
}

impl From<serde_json::Error> for PayloadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

pub type PayloadResult<T> = Result<T, PayloadError>;
