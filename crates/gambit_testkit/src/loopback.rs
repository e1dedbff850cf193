//! In-process adapters that route a client straight into a [`GameServer`].

use gambit_client::{
    ChannelConnector, ChannelTransport, ClientError, ClientResult, HttpClient, InboundSink,
};
use gambit_protocol::{HttpRequest, HttpResponse};
use gambit_server::{ConnectionId, GameServer};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// A loopback HTTP client that hands requests to [`GameServer::handle`].
///
/// Useful for testing without actual network overhead.
#[derive(Clone)]
pub struct LoopbackHttp {
    server: Arc<GameServer>,
}

impl LoopbackHttp {
    /// Creates a client for `server`.
    pub fn new(server: Arc<GameServer>) -> Self {
        Self { server }
    }
}

impl HttpClient for LoopbackHttp {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        trace!(method = %request.method, path = request.path(), "loopback request");
        Ok(self.server.handle(&request))
    }
}

/// Opens channels on a [`GameServer`].
///
/// Pushes reach the client only when the server is pumped.
#[derive(Clone)]
pub struct LoopbackConnector {
    server: Arc<GameServer>,
}

impl LoopbackConnector {
    /// Creates a connector for `server`.
    pub fn new(server: Arc<GameServer>) -> Self {
        Self { server }
    }
}

impl ChannelConnector for LoopbackConnector {
    fn open(
        &self,
        _url: &str,
        token: Option<&str>,
        sink: InboundSink,
    ) -> ClientResult<Box<dyn ChannelTransport>> {
        let conn = self.server.open_connection(token, sink);
        Ok(Box::new(LoopbackChannel {
            server: self.server.clone(),
            conn,
            open: AtomicBool::new(true),
        }))
    }
}

/// One open loopback channel.
pub struct LoopbackChannel {
    server: Arc<GameServer>,
    conn: ConnectionId,
    open: AtomicBool,
}

impl LoopbackChannel {
    /// Server-side id of this channel.
    pub fn connection_id(&self) -> ConnectionId {
        self.conn
    }
}

impl ChannelTransport for LoopbackChannel {
    fn emit(&self, event: &str, payload: &Value) -> ClientResult<()> {
        if !self.is_open() {
            return Err(ClientError::NotConnected);
        }
        self.server.receive(self.conn, event, payload);
        Ok(())
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.server.close_connection(self.conn);
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.server.is_connection_open(self.conn)
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        self.close();
    }
}
