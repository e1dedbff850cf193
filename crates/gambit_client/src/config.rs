//! Configuration for the client.

use std::time::Duration;

/// Configuration for a [`GambitClient`](crate::GambitClient) and its parts.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the request/response API (e.g., "http://localhost:5000").
    pub api_base_url: String,
    /// URL of the persistent channel.
    pub channel_url: String,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Whether a 401 triggers one token refresh and retry.
    pub refresh_on_unauthorized: bool,
    /// Path of the token refresh endpoint.
    pub refresh_path: String,
    /// Whether pairing and challenge starts enter the new session automatically.
    pub auto_enter_sessions: bool,
}

impl ClientConfig {
    /// Creates a configuration for a server at `api_base_url`.
    ///
    /// The channel defaults to the same origin.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        let api_base_url = api_base_url.into();
        Self {
            channel_url: api_base_url.clone(),
            api_base_url,
            request_timeout: Duration::from_secs(30),
            refresh_on_unauthorized: true,
            refresh_path: "/auth/refresh".to_string(),
            auto_enter_sessions: true,
        }
    }

    /// Sets the channel URL.
    pub fn with_channel_url(mut self, url: impl Into<String>) -> Self {
        self.channel_url = url.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Disables refresh-and-retry on 401.
    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }

    /// Sets the refresh endpoint path.
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Sets whether new sessions are entered automatically.
    pub fn with_auto_enter(mut self, enabled: bool) -> Self {
        self.auto_enter_sessions = enabled;
        self
    }

    /// Joins the base URL and a path.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:5000")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_builder() {
        let config = ClientConfig::new("https://chess.example.com/")
            .with_channel_url("wss://chess.example.com/socket")
            .with_request_timeout(Duration::from_secs(5))
            .without_refresh()
            .with_auto_enter(false);

        assert_eq!(config.channel_url, "wss://chess.example.com/socket");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(!config.refresh_on_unauthorized);
        assert!(!config.auto_enter_sessions);
        assert_eq!(
            config.api_url("/games/games/1"),
            "https://chess.example.com/games/games/1"
        );
    }

    #[test]
    fn defaults_share_origin() {
        let config = ClientConfig::default();
        assert_eq!(config.channel_url, config.api_base_url);
        assert_eq!(config.refresh_path, "/auth/refresh");
        assert!(config.auto_enter_sessions);
    }
}
