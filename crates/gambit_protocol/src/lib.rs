//! # Gambit Protocol
//!
//! Wire types and JSON codecs shared by the Gambit client and server.
//!
//! This crate provides:
//! - Server-issued identifiers (`ParticipantId`, `SessionId`, `ChallengeId`)
//! - Board vocabulary (`Side`, `Square`, `MoveNotation`, `Position`)
//! - The `RulesEngine` collaborator trait
//! - Channel event names and payloads
//! - Request/response bodies and the endpoint routing table
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod board;
mod codec;
mod error;
mod events;
mod ids;
mod rules;
mod transport;

pub use api::{
    ApiFailure, ChallengeDecision, Endpoint, GameSnapshot, JoinQueueResponse, MessageResponse,
    PendingChallenge, QueueStatusResponse, RefreshResponse, RespondChallengeResponse,
    RespondDrawRequest, SendChallengeRequest, SendChallengeResponse,
};
pub use board::{
    LegalDestination, MoveAttempt, MoveNotation, Position, PromotionPiece, Side, Square,
    START_POSITION,
};
pub use codec::{decode_body, decode_payload, encode_body, encode_payload};
pub use error::{ProtocolError, ProtocolResult};
pub use events::{
    names, ChallengeInvite, ChallengeStart, DrawDeclined, DrawOffered, GameOver, GameOverReason,
    GameRoom, MoveMade, Presence, QueuePairing, ServerEvent,
};
pub use ids::{ChallengeId, ParticipantId, SessionId};
pub use rules::{BoardOutcome, RulesEngine, RulesError};
pub use transport::{HttpRequest, HttpResponse, Method};
