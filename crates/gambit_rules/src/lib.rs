//! # Gambit Rules
//!
//! Standard chess rules for Gambit, implemented on top of `shakmaty`.
//!
//! Positions travel as FEN strings and moves as coordinate (UCI) notation.
//! [`ChessRules`] is stateless; every call parses the position it is given.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;

pub use engine::ChessRules;
pub use gambit_protocol::START_POSITION;
