//! # Gambit Client
//!
//! Client-side synchronization for remote turn-based chess.
//!
//! This crate provides:
//! - A connection manager owning one persistent channel (credential-bound,
//!   swapped on token rotation, process-wide singleton)
//! - Move reconciliation (optimistic local moves against the authoritative record)
//! - The per-game session state machine (joining → active ↔ draw-pending → terminated)
//! - Matchmaking queue and challenge negotiation clients
//! - A request/response API over a pluggable HTTP client
//!
//! ## Architecture
//!
//! The server is authoritative. Local moves show immediately and are
//! confirmed or rolled back by the server's answer or by a pushed move.
//! Every inbound transition is idempotent, so a move delivered twice, or
//! delivered both as a push and as a response, is applied once.
//!
//! ## Key Invariants
//!
//! - At most one live channel per connection manager
//! - Events from a replaced channel are never dispatched
//! - A session reports its outcome at most once
//! - Ids always come from the server

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod challenges;
mod channel;
mod client;
mod config;
mod connection;
mod credentials;
mod error;
mod http;
mod matchmaking;
mod reconcile;
mod session;

pub use api::{GameApi, MockApi};
pub use challenges::{
    ChallengeClient, ChallengeDirection, ChallengeRecord, ChallengeStatus, InviteListener,
    RespondOutcome, StartListener, CHALLENGE_HISTORY_LIMIT,
};
pub use channel::{ChannelConnector, ChannelTransport, InboundSink, MockConnector};
pub use client::{GambitClient, SessionListener};
pub use config::ClientConfig;
pub use connection::{
    global, install_global, teardown_global, ChannelHandle, ConnectionManager, EventHandler,
    ScopeId, SubscriptionId, Subscriptions,
};
pub use credentials::{Credential, CredentialChange, CredentialListener, CredentialStore, WatchId};
pub use error::{ClientError, ClientResult};
pub use http::{HttpClient, HttpGameApi};
pub use matchmaking::{JoinOutcome, Pairing, PairingListener, QueueClient, QueueStatus};
pub use reconcile::{LocalMove, MoveReconciler, Refusal, RemoteMove};
pub use session::{
    GameSessionMachine, MoveSubmission, OutcomeListener, SessionOutcome, SessionStatus,
    SessionView,
};
