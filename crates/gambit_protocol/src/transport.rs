//! Transport-neutral request/response envelopes.

use std::fmt;
use std::time::Duration;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// DELETE.
    Delete,
}

impl Method {
    /// Uppercase method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL (base url + path).
    pub url: String,
    /// Bearer token for the `Authorization` header.
    pub bearer: Option<String>,
    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Creates a bodiless request with a 30 second timeout.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            body: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the bearer token.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the path component of the url.
    ///
    /// Everything after the scheme and authority; the whole url when it is
    /// already a bare path.
    pub fn path(&self) -> &str {
        let rest = match self.url.find("://") {
            Some(idx) => &self.url[idx + 3..],
            None => return self.url.split('?').next().unwrap_or(""),
        };
        match rest.find('/') {
            Some(idx) => rest[idx..].split('?').next().unwrap_or(""),
            None => "/",
        }
    }
}

/// A response to an [`HttpRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// JSON body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_strips_authority_and_query() {
        let req = HttpRequest::new(Method::Get, "http://localhost:5000/games/games/3?x=1");
        assert_eq!(req.path(), "/games/games/3");

        let req = HttpRequest::new(Method::Get, "http://localhost:5000");
        assert_eq!(req.path(), "/");

        let req = HttpRequest::new(Method::Delete, "/matchmaking/matchmaking");
        assert_eq!(req.path(), "/matchmaking/matchmaking");
    }

    #[test]
    fn success_range() {
        assert!(HttpResponse::new(201, vec![]).is_success());
        assert!(!HttpResponse::new(401, vec![]).is_success());
    }
}
