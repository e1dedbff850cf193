//! The process-wide connection manager.
//!
//! [`ConnectionManager`] owns at most one live channel and hides channel swaps
//! from its callers: handlers registered with [`ConnectionManager::on`] and
//! scopes registered with [`ConnectionManager::retain_scope`] survive every
//! reconnect. Each open bumps a generation counter, and events delivered by a
//! channel of an older generation are dropped.
//!
//! Connectors must not deliver inbound events from inside `open` or `emit`.

use crate::channel::{ChannelConnector, ChannelTransport, InboundSink};
use crate::credentials::{Credential, CredentialChange, CredentialStore, WatchId};
use crate::error::{ClientError, ClientResult};
use gambit_protocol::{encode_payload, names, ParticipantId, Presence};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

/// Callback for an inbound event payload.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies one handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Identifies one retained scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

/// Describes the channel that is currently open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHandle {
    generation: u64,
    participant_id: Option<ParticipantId>,
}

impl ChannelHandle {
    /// Generation of the channel. Every open increments it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Participant the channel authenticated as.
    pub fn participant_id(&self) -> Option<ParticipantId> {
        self.participant_id
    }

    /// Whether the channel was opened with a credential.
    pub fn is_authenticated(&self) -> bool {
        self.participant_id.is_some()
    }
}

struct Scope {
    event: String,
    payload: Value,
    release: Option<(String, Value)>,
}

struct Live {
    handle: ChannelHandle,
    channel: Box<dyn ChannelTransport>,
}

struct Inner {
    url: String,
    connector: Arc<dyn ChannelConnector>,
    live: Mutex<Option<Live>>,
    generation: AtomicU64,
    credential: RwLock<Option<Credential>>,
    handlers: RwLock<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
    scopes: RwLock<BTreeMap<ScopeId, Scope>>,
    next_id: AtomicU64,
    watching: Mutex<Option<(Arc<CredentialStore>, WatchId)>>,
}

impl Inner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn dispatch(&self, generation: u64, event: &str, payload: &Value) {
        let current = self.generation.load(Ordering::SeqCst);
        if generation != current {
            trace!(event, generation, current, "dropping event from replaced channel");
            return;
        }
        let handlers: Vec<EventHandler> = match self.handlers.read().get(event) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => Vec::new(),
        };
        trace!(event, handlers = handlers.len(), "inbound event");
        for handler in handlers {
            handler(payload);
        }
    }
}

/// Owns the single live channel of the process.
///
/// Cloning is cheap; all clones share the same channel and registrations.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Creates a manager that opens channels to `url` through `connector`.
    ///
    /// Nothing is opened until [`connect`](Self::connect).
    pub fn new(url: impl Into<String>, connector: Arc<dyn ChannelConnector>) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                connector,
                live: Mutex::new(None),
                generation: AtomicU64::new(0),
                credential: RwLock::new(None),
                handlers: RwLock::new(HashMap::new()),
                scopes: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                watching: Mutex::new(None),
            }),
        }
    }

    /// Opens the channel with `credential`, or unauthenticated when absent.
    ///
    /// An already open channel is replaced.
    pub fn connect(&self, credential: Option<Credential>) -> ClientResult<ChannelHandle> {
        *self.inner.credential.write() = credential;
        self.open()
    }

    /// Replaces the channel with one authenticated by `credential`.
    ///
    /// The old channel is closed without waiting. Registered handlers and
    /// retained scopes carry over to the new channel.
    pub fn reconnect(&self, credential: Option<Credential>) -> ClientResult<ChannelHandle> {
        info!(
            participant_id = ?credential.as_ref().map(|c| c.participant_id),
            "reconnecting channel"
        );
        self.connect(credential)
    }

    /// Closes the channel. Registrations are kept for a later connect.
    pub fn disconnect(&self) {
        let mut live = self.inner.live.lock();
        // Late events from the closed channel must not be dispatched.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(old) = live.take() {
            old.channel.close();
            debug!(generation = old.handle.generation, "channel closed");
        }
    }

    /// Disconnects and drops every registration and credential watch.
    pub fn teardown(&self) {
        self.disconnect();
        self.unwatch_credentials();
        self.inner.handlers.write().clear();
        self.inner.scopes.write().clear();
        *self.inner.credential.write() = None;
    }

    /// Returns the open channel, if any.
    pub fn handle(&self) -> Option<ChannelHandle> {
        self.inner.live.lock().as_ref().map(|l| l.handle)
    }

    /// Checks if a channel is open.
    pub fn is_connected(&self) -> bool {
        self.inner
            .live
            .lock()
            .as_ref()
            .map(|l| l.channel.is_open())
            .unwrap_or(false)
    }

    /// Participant of the credential the manager connects with.
    pub fn participant_id(&self) -> Option<ParticipantId> {
        self.inner
            .credential
            .read()
            .as_ref()
            .map(|c| c.participant_id)
    }

    /// Registers a handler for `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id());
        self.inner
            .handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes one handler registration.
    pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
        let mut handlers = self.inner.handlers.write();
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.inner
            .handlers
            .read()
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Sends an event on the open channel.
    pub fn emit(&self, event: &str, payload: &Value) -> ClientResult<()> {
        let live = self.inner.live.lock();
        match live.as_ref() {
            Some(live) => live.channel.emit(event, payload),
            None => Err(ClientError::NotConnected),
        }
    }

    /// Emits `event` now and again after every reopen, until released.
    ///
    /// `release` is emitted once when the scope is released.
    pub fn retain_scope(
        &self,
        event: &str,
        payload: Value,
        release: Option<(String, Value)>,
    ) -> ScopeId {
        let id = ScopeId(self.inner.next_id());
        self.inner.scopes.write().insert(
            id,
            Scope {
                event: event.to_string(),
                payload: payload.clone(),
                release,
            },
        );
        match self.emit(event, &payload) {
            Ok(()) | Err(ClientError::NotConnected) => {}
            Err(err) => warn!(event, error = %err, "failed to emit retained scope"),
        }
        id
    }

    /// Releases a retained scope.
    pub fn release_scope(&self, id: ScopeId) -> bool {
        let Some(scope) = self.inner.scopes.write().remove(&id) else {
            return false;
        };
        if let Some((event, payload)) = scope.release {
            match self.emit(&event, &payload) {
                Ok(()) | Err(ClientError::NotConnected) => {}
                Err(err) => warn!(event = %event, error = %err, "failed to emit scope release"),
            }
        }
        true
    }

    /// Number of retained scopes.
    pub fn scope_count(&self) -> usize {
        self.inner.scopes.read().len()
    }

    /// Creates an empty registration guard bound to this manager.
    pub fn subscriptions(&self) -> Subscriptions {
        Subscriptions::new(self.clone())
    }

    /// Follows `store`: login and token rotation reconnect, logout disconnects.
    ///
    /// Replaces any previous watch.
    pub fn watch_credentials(&self, store: Arc<CredentialStore>) {
        self.unwatch_credentials();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let id = store.watch(Arc::new(move |change: &CredentialChange| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = ConnectionManager { inner };
            let result = match change {
                CredentialChange::Replaced(credential) | CredentialChange::Rotated(credential) => {
                    manager.reconnect(Some(credential.clone())).map(|_| ())
                }
                CredentialChange::Cleared => {
                    *manager.inner.credential.write() = None;
                    manager.disconnect();
                    Ok(())
                }
            };
            if let Err(err) = result {
                warn!(error = %err, "channel swap after credential change failed");
            }
        }));
        *self.inner.watching.lock() = Some((store, id));
    }

    /// Stops following the credential store.
    pub fn unwatch_credentials(&self) {
        if let Some((store, id)) = self.inner.watching.lock().take() {
            store.unwatch(id);
        }
    }

    fn open(&self) -> ClientResult<ChannelHandle> {
        let credential = self.inner.credential.read().clone();
        let mut live = self.inner.live.lock();

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(old) = live.take() {
            old.channel.close();
            debug!(generation = old.handle.generation, "replaced channel closed");
        }

        let weak = Arc::downgrade(&self.inner);
        let sink: InboundSink = Arc::new(move |event: &str, payload: &Value| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(generation, event, payload);
            }
        });
        let token = credential.as_ref().map(|c| c.access_token.as_str());
        let channel = self.inner.connector.open(&self.inner.url, token, sink)?;

        let handle = ChannelHandle {
            generation,
            participant_id: credential.as_ref().map(|c| c.participant_id),
        };

        if let Some(participant) = handle.participant_id {
            let presence = encode_payload(&Presence {
                user_id: participant,
            })?;
            if let Err(err) = channel.emit(names::REGISTER_USER, &presence) {
                warn!(error = %err, "presence announcement failed");
            }
        }

        let replay: Vec<(String, Value)> = self
            .inner
            .scopes
            .read()
            .values()
            .map(|s| (s.event.clone(), s.payload.clone()))
            .collect();
        for (event, payload) in &replay {
            if let Err(err) = channel.emit(event, payload) {
                warn!(event = %event, error = %err, "failed to replay scope");
            }
        }

        info!(
            generation,
            participant_id = ?handle.participant_id,
            replayed = replay.len(),
            "channel open"
        );
        *live = Some(Live { handle, channel });
        Ok(handle)
    }
}

/// A set of handler registrations and scopes owned by one component.
///
/// Clearing or dropping the set undoes every registration in it.
pub struct Subscriptions {
    manager: ConnectionManager,
    handlers: Vec<(String, SubscriptionId)>,
    scopes: Vec<ScopeId>,
}

impl Subscriptions {
    /// Creates an empty set.
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            handlers: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// Registers a handler and remembers it.
    pub fn on<F>(&mut self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.manager.on(event, handler);
        self.handlers.push((event.to_string(), id));
        id
    }

    /// Retains a scope and remembers it.
    pub fn retain(
        &mut self,
        event: &str,
        payload: Value,
        release: Option<(String, Value)>,
    ) -> ScopeId {
        let id = self.manager.retain_scope(event, payload, release);
        self.scopes.push(id);
        id
    }

    /// Number of registrations held.
    pub fn len(&self) -> usize {
        self.handlers.len() + self.scopes.len()
    }

    /// Checks if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Undoes every registration.
    pub fn clear(&mut self) {
        for (event, id) in self.handlers.drain(..) {
            self.manager.off(&event, id);
        }
        for id in self.scopes.drain(..) {
            self.manager.release_scope(id);
        }
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.clear();
    }
}

static GLOBAL: RwLock<Option<ConnectionManager>> = parking_lot::const_rwlock(None);

/// Installs the process-wide manager, tearing down any previous one.
pub fn install_global(manager: ConnectionManager) {
    let previous = GLOBAL.write().replace(manager);
    if let Some(previous) = previous {
        previous.teardown();
    }
}

/// Returns the process-wide manager.
pub fn global() -> ClientResult<ConnectionManager> {
    GLOBAL.read().clone().ok_or(ClientError::NotConnected)
}

/// Tears down and removes the process-wide manager.
pub fn teardown_global() {
    let previous = GLOBAL.write().take();
    if let Some(previous) = previous {
        previous.teardown();
    }
}
