//! Board vocabulary shared by the client, the server and the rules engine.
//!
//! Positions are opaque serialized strings (FEN for standard chess). Only the
//! rules engine interprets them; everything else compares them for equality.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The standard chess starting position.
pub const START_POSITION: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// One of the two sides of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Moves first.
    White,
    /// Moves second.
    Black,
}

impl Side {
    /// Returns the other side.
    pub fn opposite(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => f.write_str("white"),
            Side::Black => f.write_str("black"),
        }
    }
}

/// A board square such as `e4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    /// Builds a square from zero-based file and rank indices.
    pub fn from_coords(file: u8, rank: u8) -> ProtocolResult<Self> {
        if file < 8 && rank < 8 {
            Ok(Self { file, rank })
        } else {
            Err(ProtocolError::InvalidSquare(format!("{file},{rank}")))
        }
    }

    /// Zero-based file index (`a` = 0).
    pub fn file(self) -> u8 {
        self.file
    }

    /// Zero-based rank index (`1` = 0).
    pub fn rank(self) -> u8 {
        self.rank
    }
}

impl FromStr for Square {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        match bytes {
            [f @ b'a'..=b'h', r @ b'1'..=b'8'] => Ok(Self {
                file: f - b'a',
                rank: r - b'1',
            }),
            _ => Err(ProtocolError::InvalidSquare(s.to_string())),
        }
    }
}

impl TryFrom<String> for Square {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Square> for String {
    fn from(square: Square) -> Self {
        square.to_string()
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file) as char, (b'1' + self.rank) as char)
    }
}

/// Piece a pawn may promote to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionPiece {
    /// Queen (`q`).
    Queen,
    /// Rook (`r`).
    Rook,
    /// Bishop (`b`).
    Bishop,
    /// Knight (`n`).
    Knight,
}

impl PromotionPiece {
    /// Returns the lowercase notation letter.
    pub fn letter(self) -> char {
        match self {
            PromotionPiece::Queen => 'q',
            PromotionPiece::Rook => 'r',
            PromotionPiece::Bishop => 'b',
            PromotionPiece::Knight => 'n',
        }
    }

    /// Parses a notation letter (either case).
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_lowercase() {
            'q' => Some(PromotionPiece::Queen),
            'r' => Some(PromotionPiece::Rook),
            'b' => Some(PromotionPiece::Bishop),
            'n' => Some(PromotionPiece::Knight),
            _ => None,
        }
    }
}

/// A move in coordinate notation (`e2e4`, `e7e8q`).
///
/// This is the form carried in the move-submission path and in `move_made`
/// pushes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MoveNotation {
    from: Square,
    to: Square,
    promotion: Option<PromotionPiece>,
}

impl MoveNotation {
    /// Creates a notation from its parts.
    pub fn new(from: Square, to: Square, promotion: Option<PromotionPiece>) -> Self {
        Self {
            from,
            to,
            promotion,
        }
    }

    /// Parses a coordinate move.
    pub fn parse(s: &str) -> ProtocolResult<Self> {
        let invalid = || ProtocolError::InvalidNotation(s.to_string());
        if !s.is_ascii() || !(4..=5).contains(&s.len()) {
            return Err(invalid());
        }
        let from: Square = s[0..2].parse().map_err(|_| invalid())?;
        let to: Square = s[2..4].parse().map_err(|_| invalid())?;
        let promotion = match s[4..].chars().next() {
            Some(c) => Some(PromotionPiece::from_letter(c).ok_or_else(invalid)?),
            None => None,
        };
        Ok(Self::new(from, to, promotion))
    }

    /// Origin square.
    pub fn from(&self) -> Square {
        self.from
    }

    /// Destination square.
    pub fn to(&self) -> Square {
        self.to
    }

    /// Promotion piece, if any.
    pub fn promotion(&self) -> Option<PromotionPiece> {
        self.promotion
    }
}

impl FromStr for MoveNotation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MoveNotation {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MoveNotation> for String {
    fn from(notation: MoveNotation) -> Self {
        notation.to_string()
    }
}

impl fmt::Display for MoveNotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(piece) = self.promotion {
            write!(f, "{}", piece.letter())?;
        }
        Ok(())
    }
}

/// A serialized board position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(String);

impl Position {
    /// Wraps a serialized position.
    pub fn new(serialized: impl Into<String>) -> Self {
        Self(serialized.into())
    }

    /// The standard starting position.
    pub fn start() -> Self {
        Self(START_POSITION.to_string())
    }

    /// Returns the serialized form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A destination reachable from a square, as reported by the rules engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegalDestination {
    /// Destination square.
    pub to: Square,
    /// Whether the move captures.
    pub capture: bool,
    /// Whether the move requires a promotion piece.
    pub promotion_eligible: bool,
}

/// A local move intent, consumed by submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveAttempt {
    /// Session the move targets.
    pub session_id: SessionId,
    /// Origin square.
    pub from: Square,
    /// Destination square.
    pub to: Square,
    /// Requested promotion piece.
    pub promotion_hint: Option<PromotionPiece>,
    /// Notation sent to the server.
    pub notation: MoveNotation,
}

impl MoveAttempt {
    /// Creates an attempt and derives its notation.
    pub fn new(
        session_id: SessionId,
        from: Square,
        to: Square,
        promotion_hint: Option<PromotionPiece>,
    ) -> Self {
        Self {
            session_id,
            from,
            to,
            promotion_hint,
            notation: MoveNotation::new(from, to, promotion_hint),
        }
    }

    /// Replaces the promotion hint and re-derives the notation.
    pub fn with_promotion(mut self, promotion: Option<PromotionPiece>) -> Self {
        self.promotion_hint = promotion;
        self.notation = MoveNotation::new(self.from, self.to, promotion);
        self
    }
}
