//! The rules-engine collaborator.
//!
//! Legality and notation are owned by an external engine. The client and the
//! reference server consume it only through this trait.

use crate::board::{LegalDestination, MoveNotation, Position, Side, Square};
use thiserror::Error;

/// Errors reported by a rules engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    /// The serialized position could not be parsed.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    /// The move is not legal in the given position.
    #[error("illegal move: {0}")]
    IllegalMove(String),
}

/// How a position ended, as judged by the rules alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardOutcome {
    /// The given side delivered mate.
    Checkmate {
        /// Winning side.
        winner: Side,
    },
    /// Side to move has no legal move and is not in check.
    Stalemate,
    /// Neither side can mate.
    InsufficientMaterial,
}

/// A pure, synchronous rules engine.
pub trait RulesEngine: Send + Sync {
    /// The position a new game starts from.
    fn initial_position(&self) -> Position;

    /// Side whose turn it is.
    fn side_to_move(&self, position: &Position) -> Result<Side, RulesError>;

    /// Legal destinations from `from` for the side to move.
    fn legal_moves(
        &self,
        position: &Position,
        from: Square,
    ) -> Result<Vec<LegalDestination>, RulesError>;

    /// Applies a move and returns the resulting position.
    fn apply_move(
        &self,
        position: &Position,
        notation: &MoveNotation,
    ) -> Result<Position, RulesError>;

    /// Returns the outcome if the position is final.
    fn outcome(&self, position: &Position) -> Result<Option<BoardOutcome>, RulesError>;
}
