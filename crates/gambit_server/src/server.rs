//! The reference server.

use crate::auth::{TokenClaims, TokenKind, TokenSigner};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{authenticate, dispatch, Context};
use crate::rooms::{ConnectionId, Delivery, EventSink, Room};
use crate::state::{ServerState, UserRecord};
use gambit_protocol::{
    decode_payload, names, GameRoom, GameSnapshot, HttpRequest, HttpResponse, MoveNotation,
    ParticipantId, Presence, RulesEngine, SessionId,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tokens handed to a newly registered participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredentials {
    /// Server-issued participant id.
    pub participant_id: ParticipantId,
    /// Display name.
    pub username: String,
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
}

/// An in-memory authoritative game server.
///
/// Requests are handled synchronously through [`GameServer::handle`].
/// Channel pushes are queued and only delivered by [`GameServer::pump`], so
/// no client callback ever runs while a request is in flight.
pub struct GameServer {
    config: ServerConfig,
    rules: Arc<dyn RulesEngine>,
    signer: TokenSigner,
    state: Mutex<ServerState>,
    outbox: Mutex<VecDeque<Delivery>>,
    /// Server time in whole seconds.
    clock: AtomicI64,
}

impl GameServer {
    /// Creates a server using `rules` to adjudicate moves.
    pub fn new(config: ServerConfig, rules: Arc<dyn RulesEngine>) -> Self {
        let signer = TokenSigner::new(config.auth_secret.clone());
        Self {
            config,
            rules,
            signer,
            state: Mutex::new(ServerState::default()),
            outbox: Mutex::new(VecDeque::new()),
            clock: AtomicI64::new(0),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Current server time in seconds.
    pub fn now(&self) -> i64 {
        self.clock.load(Ordering::SeqCst)
    }

    /// Moves server time forward.
    pub fn advance_clock(&self, by: Duration) {
        let secs = i64::try_from(by.as_secs()).unwrap_or(i64::MAX);
        self.clock.fetch_add(secs, Ordering::SeqCst);
    }

    fn mint(
        &self,
        participant: ParticipantId,
        kind: TokenKind,
        epoch: u64,
    ) -> ServerResult<String> {
        self.signer.mint(TokenClaims {
            participant,
            kind,
            epoch,
        })
    }

    /// Registers a participant and issues their first token pair.
    pub fn register_user(&self, username: impl Into<String>) -> ServerResult<IssuedCredentials> {
        let username = username.into();
        let mut state = self.state.lock();
        if state.users.values().any(|u| u.username == username) {
            return Err(ServerError::BadRequest(format!(
                "User {username} already exists"
            )));
        }
        let participant_id = state.next_user_id();
        state.users.insert(
            participant_id,
            UserRecord {
                username: username.clone(),
                access_epoch: 0,
                refresh_epoch: 0,
            },
        );
        drop(state);

        debug!(%participant_id, %username, "user registered");
        Ok(IssuedCredentials {
            participant_id,
            access_token: self.mint(participant_id, TokenKind::Access, 0)?,
            refresh_token: self.mint(participant_id, TokenKind::Refresh, 0)?,
            username,
        })
    }

    /// Issues a fresh token pair for an existing participant, like a login.
    pub fn login(&self, participant: ParticipantId) -> ServerResult<IssuedCredentials> {
        let (username, access_epoch, refresh_epoch) = {
            let state = self.state.lock();
            let user = state
                .users
                .get(&participant)
                .ok_or_else(|| ServerError::NotFound("User not found".into()))?;
            (user.username.clone(), user.access_epoch, user.refresh_epoch)
        };
        Ok(IssuedCredentials {
            participant_id: participant,
            username,
            access_token: self.mint(participant, TokenKind::Access, access_epoch)?,
            refresh_token: self.mint(participant, TokenKind::Refresh, refresh_epoch)?,
        })
    }

    /// Expires every outstanding access token of `participant`.
    pub fn expire_access_tokens(&self, participant: ParticipantId) {
        if let Some(user) = self.state.lock().users.get_mut(&participant) {
            user.access_epoch += 1;
        }
    }

    /// Revokes every outstanding refresh token of `participant`.
    pub fn revoke_refresh_tokens(&self, participant: ParticipantId) {
        if let Some(user) = self.state.lock().users.get_mut(&participant) {
            user.refresh_epoch += 1;
        }
    }

    /// Handles one request.
    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let mut emits = Vec::new();
        let mut state = self.state.lock();
        let ctx = Context {
            now: self.now(),
            rules: self.rules.as_ref(),
            config: &self.config,
            signer: &self.signer,
        };

        let response = match dispatch(&mut state, &ctx, request, &mut emits) {
            Ok(response) => response,
            Err(err) => {
                debug!(method = %request.method, path = request.path(), error = %err, "request rejected");
                err.into_response()
            }
        };

        let deliveries: Vec<Delivery> = emits
            .into_iter()
            .flat_map(|emit| state.rooms.address(emit))
            .collect();
        drop(state);

        self.outbox.lock().extend(deliveries);
        response
    }

    /// Opens a channel. Pushes for it go to `sink`.
    ///
    /// An invalid or absent token still opens the channel, unauthenticated.
    pub fn open_connection(&self, token: Option<&str>, sink: EventSink) -> ConnectionId {
        let mut state = self.state.lock();
        let participant = token.and_then(|t| {
            authenticate(&state, &self.signer, Some(t), TokenKind::Access).ok()
        });
        let id = state.rooms.open(participant, sink);
        debug!(conn = %id, ?participant, "channel opened");
        id
    }

    /// Closes a channel. Queued pushes for it are dropped on delivery.
    pub fn close_connection(&self, conn: ConnectionId) -> bool {
        let closed = self.state.lock().rooms.close(conn);
        if closed {
            debug!(conn = %conn, "channel closed");
        }
        closed
    }

    /// Handles an event emitted by a client.
    pub fn receive(&self, conn: ConnectionId, event: &str, payload: &Value) {
        let mut state = self.state.lock();
        let Some(participant) = state.rooms.participant(conn) else {
            warn!(conn = %conn, event, "event on closed channel");
            return;
        };
        let authorized = |claimed: Option<ParticipantId>| {
            !self.config.require_channel_auth
                || (participant.is_some() && (claimed.is_none() || claimed == participant))
        };

        match event {
            names::REGISTER_USER => match decode_payload::<Presence>(payload) {
                Ok(presence) if authorized(Some(presence.user_id)) => {
                    state.rooms.join(conn, Room::User(presence.user_id));
                }
                Ok(presence) => {
                    warn!(conn = %conn, user_id = %presence.user_id, "presence rejected");
                }
                Err(e) => warn!(conn = %conn, error = %e, "malformed register_user"),
            },
            names::JOIN_GAME => match decode_payload::<GameRoom>(payload) {
                Ok(room) if authorized(None) => {
                    state.rooms.join(conn, Room::Game(room.game_id));
                }
                Ok(room) => warn!(conn = %conn, session_id = %room.game_id, "room join rejected"),
                Err(e) => warn!(conn = %conn, error = %e, "malformed join_game"),
            },
            names::LEAVE_GAME => match decode_payload::<GameRoom>(payload) {
                Ok(room) => {
                    state.rooms.leave(conn, Room::Game(room.game_id));
                }
                Err(e) => warn!(conn = %conn, error = %e, "malformed leave_game"),
            },
            other => debug!(conn = %conn, event = other, "ignoring client event"),
        }
    }

    /// Delivers queued pushes until the outbox is empty.
    ///
    /// Pushes queued by handlers that run during delivery are delivered in
    /// the same call. Returns the number of pushes delivered.
    pub fn pump(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.outbox.lock().pop_front();
            let Some(delivery) = next else {
                return delivered;
            };
            let sink = self.state.lock().rooms.sink(delivery.conn);
            if let Some(sink) = sink {
                sink(delivery.event, &delivery.payload);
                delivered += 1;
            }
        }
    }

    /// Number of queued, undelivered pushes.
    pub fn pending_deliveries(&self) -> usize {
        self.outbox.lock().len()
    }

    /// Authoritative snapshot of a session.
    pub fn snapshot(&self, id: SessionId) -> Option<GameSnapshot> {
        self.state.lock().games.get(&id).map(|g| g.snapshot())
    }

    /// Moves applied in a session, in order.
    pub fn move_history(&self, id: SessionId) -> Vec<MoveNotation> {
        self.state
            .lock()
            .games
            .get(&id)
            .map(|g| g.moves.clone())
            .unwrap_or_default()
    }

    /// Participants waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Outstanding challenges.
    pub fn challenge_count(&self) -> usize {
        self.state.lock().challenges.len()
    }

    /// Open channels.
    pub fn connection_count(&self) -> usize {
        self.state.lock().rooms.len()
    }

    /// Whether a channel is still open.
    pub fn is_connection_open(&self, conn: ConnectionId) -> bool {
        self.state.lock().rooms.is_open(conn)
    }

    /// Channels currently in `room`.
    pub fn room_members(&self, room: Room) -> Vec<ConnectionId> {
        self.state.lock().rooms.members(room)
    }

    /// Authenticated participant of a channel.
    pub fn connection_participant(&self, conn: ConnectionId) -> Option<ParticipantId> {
        self.state.lock().rooms.participant(conn).flatten()
    }
}
