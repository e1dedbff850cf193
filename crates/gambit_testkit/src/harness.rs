//! A multi-player harness around one in-memory server.
//!
//! Every player is a full [`GambitClient`] talking to the same
//! [`GameServer`] through the loopback adapters. Pushes are delivered only
//! by [`Harness::pump`], so tests decide exactly when each side hears about
//! the other's actions.

use crate::loopback::{LoopbackConnector, LoopbackHttp};
use gambit_client::{
    ClientConfig, ClientError, ClientResult, Credential, CredentialStore, GambitClient, GameApi,
    GameSessionMachine, HttpGameApi, MoveSubmission, RespondOutcome,
};
use gambit_protocol::{ChallengeDecision, MoveNotation, ParticipantId, SessionId};
use gambit_rules::ChessRules;
use gambit_server::{GameServer, ServerConfig};
use std::sync::Arc;
use tracing::debug;

/// Base URL players are configured with. The loopback ignores the origin.
pub const TEST_API_URL: &str = "http://gambit.test";

/// Channel URL players are configured with.
pub const TEST_CHANNEL_URL: &str = "ws://gambit.test/socket";

/// One participant connected to the harness server.
pub struct Player {
    name: String,
    participant_id: ParticipantId,
    credentials: Arc<CredentialStore>,
    api: Arc<HttpGameApi<LoopbackHttp>>,
    client: GambitClient,
}

impl Player {
    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server-issued id.
    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    /// The client facade.
    pub fn client(&self) -> &GambitClient {
        &self.client
    }

    /// The request/response API the client uses.
    pub fn api(&self) -> &Arc<HttpGameApi<LoopbackHttp>> {
        &self.api
    }

    /// The player's credential store.
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Current session, if any.
    pub fn session(&self) -> Option<GameSessionMachine> {
        self.client.session()
    }

    /// Submits a move in coordinate notation on the current session.
    pub fn play(&self, uci: &str) -> ClientResult<MoveSubmission> {
        let session = self.session().ok_or(ClientError::SessionClosed)?;
        let notation = MoveNotation::parse(uci)?;
        debug!(player = %self.name, %notation, "playing");
        session.submit_move(notation.from(), notation.to(), notation.promotion())
    }
}

/// An in-memory server plus helpers to connect players to it.
pub struct Harness {
    server: Arc<GameServer>,
    rules: Arc<ChessRules>,
    config: ClientConfig,
}

impl Harness {
    /// Creates a harness around a default server.
    pub fn new() -> Self {
        Self::with_server_config(ServerConfig::default())
    }

    /// Creates a harness around a server with `config`.
    pub fn with_server_config(config: ServerConfig) -> Self {
        let rules = Arc::new(ChessRules::new());
        Self {
            server: Arc::new(GameServer::new(config, rules.clone())),
            rules,
            config: ClientConfig::new(TEST_API_URL).with_channel_url(TEST_CHANNEL_URL),
        }
    }

    /// Uses `config` for players added from now on.
    pub fn with_client_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// The server.
    pub fn server(&self) -> &Arc<GameServer> {
        &self.server
    }

    /// Registers `name` on the server and connects a client for it.
    pub fn add_player(&self, name: &str) -> Player {
        let issued = self
            .server
            .register_user(name)
            .expect("Failed to register player");
        let credential = Credential::new(issued.participant_id, issued.access_token)
            .with_refresh_token(issued.refresh_token)
            .with_username(issued.username);
        let credentials = Arc::new(CredentialStore::with_credential(credential));

        let api = Arc::new(HttpGameApi::new(
            self.config.clone(),
            LoopbackHttp::new(self.server.clone()),
            credentials.clone(),
        ));
        let client = GambitClient::connect(
            self.config.clone(),
            credentials.clone(),
            api.clone() as Arc<dyn GameApi>,
            Arc::new(LoopbackConnector::new(self.server.clone())),
            self.rules.clone(),
        )
        .expect("Failed to connect player");

        Player {
            name: name.to_string(),
            participant_id: issued.participant_id,
            credentials,
            api,
            client,
        }
    }

    /// Delivers every queued push, including pushes caused by delivery.
    pub fn pump(&self) -> usize {
        self.server.pump()
    }

    /// Queues `first` then `second`. `first` plays white.
    pub fn pair_via_queue(&self, first: &Player, second: &Player) -> ClientResult<SessionId> {
        first.client().queue().join_queue()?;
        self.pump();
        let outcome = second.client().queue().join_queue()?;
        self.pump();
        outcome.session_id.ok_or_else(|| {
            ClientError::transport_fatal("queue did not pair the two players")
        })
    }

    /// `challenger` challenges `challenged`, who accepts. The challenger plays white.
    pub fn pair_via_challenge(
        &self,
        challenger: &Player,
        challenged: &Player,
    ) -> ClientResult<SessionId> {
        challenger
            .client()
            .challenges()
            .send_challenge(challenged.participant_id())?;
        self.pump();

        let invite = challenged
            .client()
            .challenges()
            .incoming()
            .into_iter()
            .find(|r| r.from == Some(challenger.participant_id()))
            .ok_or_else(|| ClientError::transport_fatal("challenge invite never arrived"))?;

        let outcome = challenged
            .client()
            .challenges()
            .respond(invite.challenge_id, ChallengeDecision::Accept)?;
        self.pump();
        match outcome {
            RespondOutcome::Accepted(Some(session_id)) => Ok(session_id),
            other => Err(ClientError::transport_fatal(format!(
                "challenge not accepted: {other:?}"
            ))),
        }
    }

    /// Plays `moves` alternately, white first, pumping after each.
    pub fn play_line(
        &self,
        white: &Player,
        black: &Player,
        moves: &[&str],
    ) -> ClientResult<Vec<MoveSubmission>> {
        let mut results = Vec::with_capacity(moves.len());
        for (ply, uci) in moves.iter().enumerate() {
            let mover = if ply % 2 == 0 { white } else { black };
            results.push(mover.play(uci)?);
            self.pump();
        }
        Ok(results)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_client::SessionStatus;

    #[test]
    fn players_get_distinct_ids() {
        let harness = Harness::new();
        let alice = harness.add_player("alice");
        let bob = harness.add_player("bob");
        assert_ne!(alice.participant_id(), bob.participant_id());
        assert!(alice.client().connection().is_connected());
    }

    #[test]
    fn queue_pairing_enters_both_sessions() {
        let harness = Harness::new();
        let alice = harness.add_player("alice");
        let bob = harness.add_player("bob");

        let session_id = harness.pair_via_queue(&alice, &bob).unwrap();

        for player in [&alice, &bob] {
            let session = player.session().unwrap();
            assert_eq!(session.session_id(), session_id);
            assert_eq!(session.status(), SessionStatus::Active);
        }
        assert_eq!(harness.server().queue_len(), 0);
    }

    #[test]
    fn play_without_session_fails() {
        let harness = Harness::new();
        let alice = harness.add_player("alice");
        assert!(matches!(alice.play("e2e4"), Err(ClientError::SessionClosed)));
    }
}
