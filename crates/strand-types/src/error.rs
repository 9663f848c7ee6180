use thiserror::Error;

/// Errors produced by type-level operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("truncated input: needed {needed} more byte(s) at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("trailing garbage: {0} byte(s) left after decoding")]
    TrailingBytes(usize),

    #[error("malformed encoding: {0}")]
    Malformed(String),

    #[error("version regression for user {user}: {current} -> {attempted}")]
    VersionRegression {
        user: String,
        current: u64,
        attempted: u64,
    },
}
