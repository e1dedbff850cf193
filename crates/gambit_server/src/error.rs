//! Error types for the reference server.

use gambit_protocol::{encode_body, HttpResponse, MessageResponse};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors a request can fail with. Each maps to one status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// 400.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// 401.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// 403.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status code.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::Unauthorized(_) => 401,
            ServerError::Forbidden(_) => 403,
            ServerError::NotFound(_) => 404,
            ServerError::Internal(_) => 500,
        }
    }

    /// Message reported to the client.
    pub fn message(&self) -> &str {
        match self {
            ServerError::BadRequest(m)
            | ServerError::Unauthorized(m)
            | ServerError::Forbidden(m)
            | ServerError::NotFound(m)
            | ServerError::Internal(m) => m,
        }
    }

    /// Returns true for 4xx errors.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServerError::Internal(_))
    }

    /// Renders the error as a `{message}` response.
    pub fn into_response(self) -> HttpResponse {
        let body = encode_body(&MessageResponse::new(self.message())).unwrap_or_default();
        HttpResponse::new(self.status(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert_eq!(ServerError::Forbidden("It is not your turn".into()).status(), 403);
        assert!(ServerError::NotFound("Game not found".into()).is_client_error());
        assert!(!ServerError::Internal("oops".into()).is_client_error());
    }

    #[test]
    fn renders_message_body() {
        let response = ServerError::BadRequest("Illegal move".into()).into_response();
        assert_eq!(response.status, 400);
        assert_eq!(response.body, br#"{"message":"Illegal move"}"#);
    }
}
