//! Error types for the client.

use gambit_protocol::{ApiFailure, ProtocolError, RulesError, SessionId};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Malformed payload or body.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server answered with a structured failure.
    #[error("rejected by server: {0}")]
    Rejected(ApiFailure),

    /// The credential expired and could not be refreshed.
    #[error("credential expired, re-authentication required")]
    CredentialExpired,

    /// No channel is open.
    #[error("not connected to server")]
    NotConnected,

    /// The session no longer exists or this participant is not part of it.
    #[error("session {0} is stale")]
    StaleSession(SessionId),

    /// The session was left or has terminated.
    #[error("session closed")]
    SessionClosed,

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The rules engine could not interpret a position.
    #[error("rules error: {0}")]
    Rules(#[from] RulesError),
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::Rejected(failure) => failure.status >= 500,
            ClientError::NotConnected => true,
            _ => false,
        }
    }

    /// The structured server failure, if this is one.
    pub fn failure(&self) -> Option<&ApiFailure> {
        match self {
            ClientError::Rejected(failure) => Some(failure),
            _ => None,
        }
    }
}
