//! The composition facade.

use crate::api::GameApi;
use crate::challenges::ChallengeClient;
use crate::channel::ChannelConnector;
use crate::config::ClientConfig;
use crate::connection::{self, ConnectionManager};
use crate::credentials::{CredentialChange, CredentialStore, WatchId};
use crate::error::{ClientError, ClientResult};
use crate::matchmaking::QueueClient;
use crate::session::GameSessionMachine;
use gambit_protocol::{ParticipantId, RulesEngine, SessionId};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Callback for every session the client enters.
pub type SessionListener = Arc<dyn Fn(&GameSessionMachine) + Send + Sync>;

struct ClientInner {
    config: ClientConfig,
    local: ParticipantId,
    credentials: Arc<CredentialStore>,
    api: Arc<dyn GameApi>,
    rules: Arc<dyn RulesEngine>,
    connection: ConnectionManager,
    queue: QueueClient,
    challenges: ChallengeClient,
    session: Mutex<Option<GameSessionMachine>>,
    session_listeners: RwLock<Vec<SessionListener>>,
    credential_watch: Mutex<Option<WatchId>>,
}

impl ClientInner {
    fn leave_session(&self) -> bool {
        let current = self.session.lock().take();
        match current {
            Some(machine) => {
                machine.leave();
                true
            }
            None => false,
        }
    }

    fn forget_state(&self) {
        self.queue.reset();
        self.challenges.reset();
        self.leave_session();
    }

    fn shutdown(&self) {
        self.leave_session();
        self.queue.detach();
        self.challenges.detach();
        if let Some(id) = self.credential_watch.lock().take() {
            self.credentials.unwatch(id);
        }
        self.connection.unwatch_credentials();
        self.connection.teardown();
    }

    fn on_credential_change(&self, change: &CredentialChange) {
        match change {
            CredentialChange::Cleared => {
                debug!(participant_id = %self.local, "credential cleared, dropping client state");
                self.forget_state();
            }
            CredentialChange::Replaced(credential) if credential.participant_id != self.local => {
                warn!(
                    participant_id = %self.local,
                    new_participant_id = %credential.participant_id,
                    "another participant logged in, shutting client down"
                );
                // The channel already speaks for the new identity.
                self.connection.disconnect();
                self.shutdown();
            }
            CredentialChange::Replaced(_) | CredentialChange::Rotated(_) => {}
        }
    }

    fn enter(&self, session_id: SessionId) -> ClientResult<GameSessionMachine> {
        if let Some(current) = self.session.lock().as_ref() {
            if current.session_id() == session_id && current.is_live() {
                return Ok(current.clone());
            }
        }

        // Entering fetches over the API; the slot stays unlocked meanwhile.
        let machine = GameSessionMachine::enter(
            session_id,
            self.local,
            self.api.clone(),
            self.rules.clone(),
            &self.connection,
        )?;

        let replaced = {
            let mut slot = self.session.lock();
            match slot.as_ref() {
                Some(current) if current.session_id() == session_id && current.is_live() => {
                    machine.leave();
                    return Ok(current.clone());
                }
                _ => slot.replace(machine.clone()),
            }
        };
        if let Some(previous) = replaced {
            debug!(session_id = %previous.session_id(), "leaving previous session");
            previous.leave();
        }

        info!(%session_id, participant_id = %self.local, status = %machine.status(), "entered session");
        let listeners: Vec<SessionListener> = self.session_listeners.read().clone();
        for listener in listeners {
            listener(&machine);
        }
        Ok(machine)
    }

    fn auto_enter(&self, session_id: SessionId, source: &str) {
        if let Err(err) = self.enter(session_id) {
            warn!(%session_id, source, error = %err, "could not enter started session");
        }
    }
}

/// One participant's view of the game service.
///
/// Owns the connection, the queue and challenge clients and at most one
/// live session. With [`ClientConfig::auto_enter_sessions`] set, a queue
/// pairing or an accepted challenge enters the new session on its own.
///
/// A client serves the participant it connected as. Clearing the
/// credential (logout, or a refresh the server refused) drops queue,
/// challenge and session state. Storing a credential for a different
/// participant shuts the client down; connect a new client for that
/// participant.
#[derive(Clone)]
pub struct GambitClient {
    inner: Arc<ClientInner>,
}

impl GambitClient {
    /// Connects as the participant stored in `credentials`.
    ///
    /// Token rotation in `credentials` reconnects the channel from then on.
    pub fn connect(
        config: ClientConfig,
        credentials: Arc<CredentialStore>,
        api: Arc<dyn GameApi>,
        connector: Arc<dyn ChannelConnector>,
        rules: Arc<dyn RulesEngine>,
    ) -> ClientResult<Self> {
        let credential = credentials.current().ok_or(ClientError::CredentialExpired)?;
        let local = credential.participant_id;

        let connection = ConnectionManager::new(config.channel_url.clone(), connector);
        connection.connect(Some(credential))?;
        connection.watch_credentials(credentials.clone());

        let queue = QueueClient::new(local, api.clone(), &connection);
        let challenges =
            ChallengeClient::new(local, api.clone(), &connection).with_queue(queue.clone());

        let inner = Arc::new(ClientInner {
            config,
            local,
            credentials,
            api,
            rules,
            connection,
            queue,
            challenges,
            session: Mutex::new(None),
            session_listeners: RwLock::new(Vec::new()),
            credential_watch: Mutex::new(None),
        });

        let weak: Weak<ClientInner> = Arc::downgrade(&inner);
        let watch = inner.credentials.watch(Arc::new(move |change: &CredentialChange| {
            if let Some(inner) = weak.upgrade() {
                inner.on_credential_change(change);
            }
        }));
        *inner.credential_watch.lock() = Some(watch);

        if inner.config.auto_enter_sessions {
            let weak: Weak<ClientInner> = Arc::downgrade(&inner);
            inner.queue.on_pairing(move |pairing| {
                if let Some(inner) = weak.upgrade() {
                    inner.auto_enter(pairing.session_id, "queue");
                }
            });
            let weak: Weak<ClientInner> = Arc::downgrade(&inner);
            inner.challenges.on_start(move |session_id| {
                if let Some(inner) = weak.upgrade() {
                    inner.auto_enter(session_id, "challenge");
                }
            });
        }

        info!(participant_id = %local, "client connected");
        Ok(Self { inner })
    }

    /// Local participant.
    pub fn participant_id(&self) -> ParticipantId {
        self.inner.local
    }

    /// Configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    /// Credential store.
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.inner.credentials
    }

    /// Matchmaking queue client.
    pub fn queue(&self) -> &QueueClient {
        &self.inner.queue
    }

    /// Challenge client.
    pub fn challenges(&self) -> &ChallengeClient {
        &self.inner.challenges
    }

    /// Registers a callback for every entered session.
    pub fn on_session<F>(&self, listener: F)
    where
        F: Fn(&GameSessionMachine) + Send + Sync + 'static,
    {
        self.inner.session_listeners.write().push(Arc::new(listener));
    }

    /// Enters `session_id`, leaving any other session.
    ///
    /// Entering the current live session returns it unchanged.
    pub fn enter_session(&self, session_id: SessionId) -> ClientResult<GameSessionMachine> {
        self.inner.enter(session_id)
    }

    /// The current session, live or terminated.
    pub fn session(&self) -> Option<GameSessionMachine> {
        self.inner.session.lock().clone()
    }

    /// Leaves the current session. Returns whether there was one.
    pub fn leave_session(&self) -> bool {
        self.inner.leave_session()
    }

    /// Clears the credential, which closes the channel, and forgets all
    /// queue, challenge and session state.
    pub fn logout(&self) {
        self.inner.credentials.clear();
        // The watch is gone after a shutdown.
        self.inner.forget_state();
        info!(participant_id = %self.inner.local, "logged out");
    }

    /// Leaves everything and tears the connection down.
    pub fn shutdown(&self) {
        self.inner.shutdown();
        debug!(participant_id = %self.inner.local, "client shut down");
    }

    /// Makes this client's connection the process-wide one.
    pub fn install_global(&self) {
        connection::install_global(self.inner.connection.clone());
    }
}
