//! Identifier parsing errors.

use thiserror::Error;

/// Errors produced when parsing a prefixed identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier cannot be empty")]
    Empty,

    #[error("identifier missing '_' separator")]
    MissingSeparator,

    #[error("wrong identifier prefix: expected '{expected}', got '{actual}'")]
    WrongPrefix {
        expected: &'static str,
        actual: String,
    },

    #[error("invalid ULID '{value}': {reason}")]
    InvalidUlid { value: String, reason: String },
}

impl IdError {
    /// Returns true when the input named a different entity kind.
    pub fn is_prefix_error(&self) -> bool {
        matches!(self, IdError::WrongPrefix { .. })
    }
}
