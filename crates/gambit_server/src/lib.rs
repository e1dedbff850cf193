//! # Gambit Server
//!
//! Reference in-memory authoritative server for Gambit.
//!
//! This crate provides:
//! - The request/response surface (games, queue, challenges, token refresh)
//! - Channel connections with `user_{id}` and `game_{id}` rooms
//! - HMAC-signed bearer tokens with bulk expiry
//! - Per-side game clocks driven by a manual server clock
//!
//! # Delivery model
//!
//! Handlers never call into clients. Pushes are addressed to rooms when a
//! request completes and wait in an outbox until [`GameServer::pump`] runs,
//! which models the event loop of a real socket server deterministically.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod rooms;
mod server;
mod state;

pub use auth::{TokenClaims, TokenKind, TokenSigner};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use rooms::{ConnectionId, EventSink, Room};
pub use server::{GameServer, IssuedCredentials};
