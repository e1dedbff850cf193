//! The current credential and its rotation.
//!
//! Login, token refresh and logout all go through [`CredentialStore`], which
//! notifies watchers after every change. The connection manager watches the
//! store so the channel always authenticates as the current identity.

use gambit_protocol::ParticipantId;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// An authenticated identity.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Participant the tokens belong to.
    pub participant_id: ParticipantId,
    /// Bearer token for API calls and the channel.
    pub access_token: String,
    /// Token exchanged for a new access token.
    pub refresh_token: Option<String>,
    /// Display name.
    pub username: Option<String>,
}

impl Credential {
    /// Creates a credential without a refresh token.
    pub fn new(participant_id: ParticipantId, access_token: impl Into<String>) -> Self {
        Self {
            participant_id,
            access_token: access_token.into(),
            refresh_token: None,
            username: None,
        }
    }

    /// Sets the refresh token.
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// Sets the display name.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Tokens stay out of logs.
        f.debug_struct("Credential")
            .field("participant_id", &self.participant_id)
            .field("username", &self.username)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// A change to the stored credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialChange {
    /// A new identity was stored (login).
    Replaced(Credential),
    /// The access token of the same identity was renewed (refresh).
    Rotated(Credential),
    /// The credential was removed (logout).
    Cleared,
}

/// Callback for credential changes.
pub type CredentialListener = Arc<dyn Fn(&CredentialChange) + Send + Sync>;

/// Handle for removing a credential listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

/// Holds the current credential and notifies watchers of changes.
#[derive(Default)]
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
    listeners: RwLock<Vec<(WatchId, CredentialListener)>>,
    next_watch: AtomicU64,
}

impl CredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `credential`.
    pub fn with_credential(credential: Credential) -> Self {
        let store = Self::new();
        *store.current.write() = Some(credential);
        store
    }

    /// Returns the current credential.
    pub fn current(&self) -> Option<Credential> {
        self.current.read().clone()
    }

    /// Returns the current access token.
    pub fn access_token(&self) -> Option<String> {
        self.current.read().as_ref().map(|c| c.access_token.clone())
    }

    /// Returns the current refresh token.
    pub fn refresh_token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .and_then(|c| c.refresh_token.clone())
    }

    /// Returns the authenticated participant.
    pub fn participant_id(&self) -> Option<ParticipantId> {
        self.current.read().as_ref().map(|c| c.participant_id)
    }

    /// Stores a new identity.
    pub fn replace(&self, credential: Credential) {
        *self.current.write() = Some(credential.clone());
        debug!(participant_id = %credential.participant_id, "credential replaced");
        self.notify(&CredentialChange::Replaced(credential));
    }

    /// Renews the access token of the current identity.
    ///
    /// Returns false (and notifies nobody) when no credential is stored.
    pub fn rotate_access_token(&self, access_token: impl Into<String>) -> bool {
        let rotated = {
            let mut current = self.current.write();
            match current.as_mut() {
                Some(credential) => {
                    credential.access_token = access_token.into();
                    credential.clone()
                }
                None => return false,
            }
        };
        debug!(participant_id = %rotated.participant_id, "access token rotated");
        self.notify(&CredentialChange::Rotated(rotated));
        true
    }

    /// Removes the credential.
    pub fn clear(&self) {
        let previous = self.current.write().take();
        if previous.is_some() {
            debug!("credential cleared");
            self.notify(&CredentialChange::Cleared);
        }
    }

    /// Registers a listener for changes.
    pub fn watch(&self, listener: CredentialListener) -> WatchId {
        let id = WatchId(self.next_watch.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push((id, listener));
        id
    }

    /// Removes a listener.
    pub fn unwatch(&self, id: WatchId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(watch, _)| *watch != id);
        listeners.len() != before
    }

    fn notify(&self, change: &CredentialChange) {
        // Listeners may touch the store, so none run under a lock.
        let listeners: Vec<CredentialListener> =
            self.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(change);
        }
    }
}
