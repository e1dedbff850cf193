//! Persistent channel abstraction.
//!
//! A [`ChannelConnector`] opens one bidirectional event channel for a URL
//! and an optional bearer token. Inbound events are handed to the sink given
//! at open time; outbound events go through [`ChannelTransport::emit`].
//! This allows socket.io, raw WebSocket or in-process loopback transports.

use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Receives `(event name, payload)` for every inbound event.
pub type InboundSink = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// One open channel.
pub trait ChannelTransport: Send + Sync {
    /// Sends an event.
    fn emit(&self, event: &str, payload: &Value) -> ClientResult<()>;

    /// Closes the channel without waiting for acknowledgment.
    fn close(&self);

    /// Checks if the channel is still open.
    fn is_open(&self) -> bool;
}

/// Opens channels.
pub trait ChannelConnector: Send + Sync {
    /// Opens a channel authenticated with `token`, or unauthenticated.
    fn open(
        &self,
        url: &str,
        token: Option<&str>,
        sink: InboundSink,
    ) -> ClientResult<Box<dyn ChannelTransport>>;
}

struct MockChannelState {
    token: Option<String>,
    sink: InboundSink,
    open: bool,
    emitted: Vec<(String, Value)>,
}

#[derive(Default)]
struct MockState {
    channels: Vec<MockChannelState>,
    fail_next: bool,
}

/// A mock connector for testing.
///
/// Every channel it opens is recorded; inbound events are injected by hand.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Creates a new mock connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `open` fail.
    pub fn fail_next_open(&self) {
        self.state.lock().fail_next = true;
    }

    /// Number of channels opened so far.
    pub fn open_count(&self) -> usize {
        self.state.lock().channels.len()
    }

    /// Tokens used for each open, in order.
    pub fn tokens(&self) -> Vec<Option<String>> {
        self.state
            .lock()
            .channels
            .iter()
            .map(|c| c.token.clone())
            .collect()
    }

    /// Whether channel `index` (in open order) is still open.
    pub fn is_channel_open(&self, index: usize) -> bool {
        self.state
            .lock()
            .channels
            .get(index)
            .map(|c| c.open)
            .unwrap_or(false)
    }

    /// Events emitted on channel `index`.
    pub fn emitted_on(&self, index: usize) -> Vec<(String, Value)> {
        self.state
            .lock()
            .channels
            .get(index)
            .map(|c| c.emitted.clone())
            .unwrap_or_default()
    }

    /// Events emitted on the most recent channel.
    pub fn emitted(&self) -> Vec<(String, Value)> {
        let count = self.open_count();
        match count {
            0 => Vec::new(),
            n => self.emitted_on(n - 1),
        }
    }

    /// Delivers an inbound event on the most recent channel if it is open.
    pub fn inject(&self, event: &str, payload: Value) -> bool {
        let sink = {
            let state = self.state.lock();
            match state.channels.last() {
                Some(channel) if channel.open => channel.sink.clone(),
                _ => return false,
            }
        };
        sink(event, &payload);
        true
    }

    /// Delivers an inbound event through channel `index`, open or not.
    ///
    /// Models a late event from a channel that was already replaced.
    pub fn inject_into(&self, index: usize, event: &str, payload: Value) -> bool {
        let sink = match self.state.lock().channels.get(index) {
            Some(channel) => channel.sink.clone(),
            None => return false,
        };
        sink(event, &payload);
        true
    }
}

impl ChannelConnector for MockConnector {
    fn open(
        &self,
        _url: &str,
        token: Option<&str>,
        sink: InboundSink,
    ) -> ClientResult<Box<dyn ChannelTransport>> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next) {
            return Err(ClientError::transport_retryable("mock open failure"));
        }
        state.channels.push(MockChannelState {
            token: token.map(str::to_string),
            sink,
            open: true,
            emitted: Vec::new(),
        });
        Ok(Box::new(MockChannel {
            state: self.state.clone(),
            index: state.channels.len() - 1,
        }))
    }
}

struct MockChannel {
    state: Arc<Mutex<MockState>>,
    index: usize,
}

impl ChannelTransport for MockChannel {
    fn emit(&self, event: &str, payload: &Value) -> ClientResult<()> {
        let mut state = self.state.lock();
        match state.channels.get_mut(self.index) {
            Some(channel) if channel.open => {
                channel.emitted.push((event.to_string(), payload.clone()));
                Ok(())
            }
            _ => Err(ClientError::NotConnected),
        }
    }

    fn close(&self) {
        if let Some(channel) = self.state.lock().channels.get_mut(self.index) {
            channel.open = false;
        }
    }

    fn is_open(&self) -> bool {
        self.state
            .lock()
            .channels
            .get(self.index)
            .map(|c| c.open)
            .unwrap_or(false)
    }
}
