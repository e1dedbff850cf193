//! shakmaty-backed [`RulesEngine`].

use gambit_protocol::{
    BoardOutcome, LegalDestination, MoveNotation, Position, PromotionPiece, RulesEngine,
    RulesError, Side, Square,
};
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position as _, Role};
use tracing::trace;

/// Standard chess rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChessRules;

impl ChessRules {
    /// Creates the engine.
    pub fn new() -> Self {
        Self
    }

    fn parse(position: &Position) -> Result<Chess, RulesError> {
        let fen: Fen = position
            .as_str()
            .parse()
            .map_err(|e| RulesError::InvalidPosition(format!("{e}")))?;
        fen.into_position(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidPosition(format!("{e}")))
    }

    fn serialize(chess: Chess) -> Position {
        Position::new(Fen::from_position(chess, EnPassantMode::Legal).to_string())
    }

    fn side(color: Color) -> Side {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }

    fn square(square: shakmaty::Square) -> Option<Square> {
        square.to_string().parse().ok()
    }

    fn piece(role: Role) -> Option<PromotionPiece> {
        match role {
            Role::Queen => Some(PromotionPiece::Queen),
            Role::Rook => Some(PromotionPiece::Rook),
            Role::Bishop => Some(PromotionPiece::Bishop),
            Role::Knight => Some(PromotionPiece::Knight),
            _ => None,
        }
    }
}

impl RulesEngine for ChessRules {
    fn initial_position(&self) -> Position {
        Self::serialize(Chess::default())
    }

    fn side_to_move(&self, position: &Position) -> Result<Side, RulesError> {
        Ok(Self::side(Self::parse(position)?.turn()))
    }

    fn legal_moves(
        &self,
        position: &Position,
        from: Square,
    ) -> Result<Vec<LegalDestination>, RulesError> {
        let chess = Self::parse(position)?;
        let mut destinations: Vec<LegalDestination> = Vec::new();

        for m in chess.legal_moves().iter() {
            // Castling is reported as king-to-two-squares, not king-takes-rook.
            let UciMove::Normal {
                from: origin,
                to,
                promotion,
            } = UciMove::from_move(m, CastlingMode::Standard)
            else {
                continue;
            };
            if Self::square(origin) != Some(from) {
                continue;
            }
            let Some(to) = Self::square(to) else {
                continue;
            };
            let promotion_eligible = promotion.and_then(Self::piece).is_some();

            match destinations.iter_mut().find(|d| d.to == to) {
                Some(existing) => existing.promotion_eligible |= promotion_eligible,
                None => destinations.push(LegalDestination {
                    to,
                    capture: m.is_capture(),
                    promotion_eligible,
                }),
            }
        }

        Ok(destinations)
    }

    fn apply_move(
        &self,
        position: &Position,
        notation: &MoveNotation,
    ) -> Result<Position, RulesError> {
        let chess = Self::parse(position)?;
        let illegal = || RulesError::IllegalMove(notation.to_string());

        let uci: UciMove = notation.to_string().parse().map_err(|_| illegal())?;
        let m = uci.to_move(&chess).map_err(|_| illegal())?;
        if !chess.is_legal(&m) {
            return Err(illegal());
        }
        let next = chess.play(&m).map_err(|_| illegal())?;
        trace!(notation = %notation, "applied move");
        Ok(Self::serialize(next))
    }

    fn outcome(&self, position: &Position) -> Result<Option<BoardOutcome>, RulesError> {
        let chess = Self::parse(position)?;
        let outcome = if chess.is_checkmate() {
            // The side to move is mated.
            Some(BoardOutcome::Checkmate {
                winner: Self::side(chess.turn()).opposite(),
            })
        } else if chess.is_stalemate() {
            Some(BoardOutcome::Stalemate)
        } else if chess.is_insufficient_material() {
            Some(BoardOutcome::InsufficientMaterial)
        } else {
            None
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_protocol::START_POSITION;

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    fn mv(uci: &str) -> MoveNotation {
        MoveNotation::parse(uci).unwrap()
    }

    fn play(rules: &ChessRules, moves: &[&str]) -> Position {
        moves.iter().fold(rules.initial_position(), |pos, m| {
            rules.apply_move(&pos, &mv(m)).unwrap()
        })
    }

    #[test]
    fn starting_position() {
        let rules = ChessRules::new();
        let start = rules.initial_position();
        assert_eq!(start.as_str(), START_POSITION);
        assert_eq!(rules.side_to_move(&start).unwrap(), Side::White);
        assert_eq!(rules.outcome(&start).unwrap(), None);
    }

    #[test]
    fn pawn_destinations_from_start() {
        let rules = ChessRules::new();
        let dests = rules.legal_moves(&Position::start(), sq("e2")).unwrap();
        let mut names: Vec<String> = dests.iter().map(|d| d.to.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["e3", "e4"]);
        assert!(dests.iter().all(|d| !d.capture && !d.promotion_eligible));
    }

    #[test]
    fn no_destinations_for_side_not_to_move() {
        let rules = ChessRules::new();
        let dests = rules.legal_moves(&Position::start(), sq("e7")).unwrap();
        assert!(dests.is_empty());
    }

    #[test]
    fn apply_flips_turn() {
        let rules = ChessRules::new();
        let pos = play(&rules, &["e2e4"]);
        assert_eq!(rules.side_to_move(&pos).unwrap(), Side::Black);
        assert!(pos.as_str().starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b"));
    }

    #[test]
    fn illegal_move_is_rejected() {
        let rules = ChessRules::new();
        let err = rules.apply_move(&Position::start(), &mv("e2e5")).unwrap_err();
        assert_eq!(err, RulesError::IllegalMove("e2e5".into()));

        let err = rules.apply_move(&Position::start(), &mv("e7e5")).unwrap_err();
        assert!(matches!(err, RulesError::IllegalMove(_)));
    }

    #[test]
    fn invalid_position_is_rejected() {
        let rules = ChessRules::new();
        let err = rules.side_to_move(&Position::new("not a fen")).unwrap_err();
        assert!(matches!(err, RulesError::InvalidPosition(_)));
    }

    #[test]
    fn promotion_is_flagged_and_applied() {
        let rules = ChessRules::new();
        let pos = Position::new("8/P7/8/8/8/8/8/4K2k w - - 0 1");
        let dests = rules.legal_moves(&pos, sq("a7")).unwrap();
        assert_eq!(dests.len(), 1);
        assert!(dests[0].promotion_eligible);

        assert!(rules.apply_move(&pos, &mv("a7a8")).is_err());
        let promoted = rules.apply_move(&pos, &mv("a7a8q")).unwrap();
        assert!(promoted.as_str().starts_with("Q7/"));
    }

    #[test]
    fn capture_is_flagged() {
        let rules = ChessRules::new();
        let pos = Position::new("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 2");
        let dests = rules.legal_moves(&pos, sq("e4")).unwrap();
        let capture = dests.iter().find(|d| d.to == sq("d5")).unwrap();
        assert!(capture.capture);
    }

    #[test]
    fn castling_uses_king_destination() {
        let rules = ChessRules::new();
        let pos = Position::new("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
        let dests = rules.legal_moves(&pos, sq("e1")).unwrap();
        assert!(dests.iter().any(|d| d.to == sq("g1")));
        assert!(dests.iter().any(|d| d.to == sq("c1")));

        let castled = rules.apply_move(&pos, &mv("e1g1")).unwrap();
        assert!(castled.as_str().starts_with("r3k2r/8/8/8/8/8/8/R4RK1 b"));
    }

    #[test]
    fn fools_mate_outcome() {
        let rules = ChessRules::new();
        let pos = play(&rules, &["f2f3", "e7e5", "g2g4", "d8h4"]);
        assert_eq!(
            rules.outcome(&pos).unwrap(),
            Some(BoardOutcome::Checkmate {
                winner: Side::Black
            })
        );
    }

    #[test]
    fn stalemate_and_bare_kings() {
        let rules = ChessRules::new();
        let stalemate = Position::new("8/8/8/8/8/6q1/5k2/7K w - - 0 1");
        assert_eq!(
            rules.outcome(&stalemate).unwrap(),
            Some(BoardOutcome::Stalemate)
        );

        let bare = Position::new("8/8/8/4k3/8/8/8/4K3 w - - 0 1");
        assert_eq!(
            rules.outcome(&bare).unwrap(),
            Some(BoardOutcome::InsufficientMaterial)
        );
    }
}
