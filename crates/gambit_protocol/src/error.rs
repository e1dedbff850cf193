//! Error types for the protocol layer.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while building or parsing wire values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Square name is not in `a1`..`h8`.
    #[error("invalid square: {0}")]
    InvalidSquare(String),

    /// Move notation is not a coordinate move such as `e2e4` or `e7e8q`.
    #[error("invalid move notation: {0}")]
    InvalidNotation(String),

    /// A payload could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// A payload could not be deserialized.
    #[error("decode error: {0}")]
    Decode(String),

    /// No endpoint matches the method and path.
    #[error("no route for {method} {path}")]
    UnknownRoute {
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
    },

    /// Channel event name is not part of the protocol.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}
