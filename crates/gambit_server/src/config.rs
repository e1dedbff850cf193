//! Server configuration.

use std::time::Duration;

/// Configuration for the reference server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Seconds on each clock when a game starts.
    pub initial_clock_secs: i64,
    /// Challenges older than this are dropped. `None` keeps them forever.
    pub challenge_ttl: Option<Duration>,
    /// Whether channel presence and room joins require a valid access token.
    pub require_channel_auth: bool,
    /// Secret used to sign bearer tokens.
    pub auth_secret: Vec<u8>,
}

impl ServerConfig {
    /// Creates a configuration with ten-minute clocks.
    pub fn new() -> Self {
        Self {
            initial_clock_secs: 600,
            challenge_ttl: None,
            require_channel_auth: true,
            auth_secret: b"gambit-reference-server".to_vec(),
        }
    }

    /// Sets the starting clock for both sides.
    pub fn with_initial_clock(mut self, secs: i64) -> Self {
        self.initial_clock_secs = secs;
        self
    }

    /// Expires challenges after `ttl`.
    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = Some(ttl);
        self
    }

    /// Allows unauthenticated channels to announce presence and join rooms.
    pub fn with_open_channels(mut self) -> Self {
        self.require_channel_auth = false;
        self
    }

    /// Sets the token signing secret.
    pub fn with_auth_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.auth_secret = secret.into();
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
