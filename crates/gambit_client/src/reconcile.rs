//! Optimistic move reconciliation.
//!
//! [`MoveReconciler`] is a two-phase value cell. In the idle phase it holds
//! the last authoritative position. A local move moves it to the optimistic
//! phase, which lasts until the server confirms the move, reports another
//! position, or the move is rolled back. At most one local move is ever in
//! flight.
//!
//! The reconciler performs no I/O; the session state machine issues the
//! request between [`MoveReconciler::apply_local`] and
//! [`MoveReconciler::acknowledge`] or [`MoveReconciler::rollback_to`].

use crate::error::ClientResult;
use gambit_protocol::{
    LegalDestination, MoveAttempt, MoveNotation, Position, PromotionPiece, RulesEngine,
    RulesError, Side, Square,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Why a local move was refused without contacting the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// The local participant does not play in this session.
    Spectator,
    /// The opponent is to move.
    NotYourTurn,
    /// Another local move is still in flight.
    MovePending,
    /// The rules engine rejects the move.
    IllegalMove,
    /// The session is still joining or has ended.
    NotActive,
}

/// Result of [`MoveReconciler::apply_local`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalMove {
    /// The move was applied optimistically and must be submitted.
    Accepted {
        /// Notation to submit, with the promotion piece resolved.
        notation: MoveNotation,
        /// Optimistic position.
        position: Position,
    },
    /// Nothing changed.
    Refused(Refusal),
}

impl LocalMove {
    /// Whether the move was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, LocalMove::Accepted { .. })
    }
}

/// What an authoritative position did to the local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMove {
    /// It matched the in-flight local move, which is now authoritative.
    Confirmed,
    /// It is the position already held.
    Duplicate,
    /// It is an earlier position of this session.
    Stale,
    /// The pushed move was applied to the idle position.
    CaughtUp,
    /// The local state was replaced by the server's position.
    Resynced,
}

impl RemoteMove {
    /// Whether the held position changed.
    pub fn changed_position(self) -> bool {
        matches!(self, RemoteMove::CaughtUp | RemoteMove::Resynced)
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Optimistic {
        attempt: MoveAttempt,
        notation: MoveNotation,
        position: Position,
    },
}

/// Local and authoritative position of one session.
pub struct MoveReconciler {
    rules: Arc<dyn RulesEngine>,
    local_side: Option<Side>,
    timeline: Vec<Position>,
    phase: Phase,
}

impl MoveReconciler {
    /// Creates a reconciler holding the authoritative `position`.
    ///
    /// `local_side` is `None` for spectators, who can never move.
    pub fn new(rules: Arc<dyn RulesEngine>, local_side: Option<Side>, position: Position) -> Self {
        Self {
            rules,
            local_side,
            timeline: vec![position],
            phase: Phase::Idle,
        }
    }

    /// Side the local participant plays.
    pub fn local_side(&self) -> Option<Side> {
        self.local_side
    }

    /// Position to display: the optimistic one while a move is in flight.
    pub fn current_position(&self) -> &Position {
        match &self.phase {
            Phase::Optimistic { position, .. } => position,
            Phase::Idle => self.authoritative_position(),
        }
    }

    /// Last position confirmed by the server.
    pub fn authoritative_position(&self) -> &Position {
        // The timeline is never empty.
        &self.timeline[self.timeline.len() - 1]
    }

    /// The in-flight local move.
    pub fn pending(&self) -> Option<&MoveAttempt> {
        match &self.phase {
            Phase::Optimistic { attempt, .. } => Some(attempt),
            Phase::Idle => None,
        }
    }

    /// Notation of the in-flight local move.
    pub fn pending_notation(&self) -> Option<&MoveNotation> {
        match &self.phase {
            Phase::Optimistic { notation, .. } => Some(notation),
            Phase::Idle => None,
        }
    }

    /// Whether no local move is in flight.
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    /// Whether it is the local participant's turn in the authoritative position.
    pub fn is_local_turn(&self) -> ClientResult<bool> {
        let to_move = self.rules.side_to_move(self.authoritative_position())?;
        Ok(self.local_side == Some(to_move))
    }

    /// Destinations reachable from `from` in the current position.
    pub fn legal_destinations(&self, from: Square) -> ClientResult<Vec<LegalDestination>> {
        Ok(self.rules.legal_moves(self.current_position(), from)?)
    }

    /// Applies a local move optimistically.
    ///
    /// A refusal leaves everything unchanged. A pawn reaching the last rank
    /// promotes to a queen unless the attempt names another piece.
    pub fn apply_local(&mut self, attempt: MoveAttempt) -> ClientResult<LocalMove> {
        if !self.is_idle() {
            return Ok(LocalMove::Refused(Refusal::MovePending));
        }
        let Some(side) = self.local_side else {
            return Ok(LocalMove::Refused(Refusal::Spectator));
        };
        let base = self.authoritative_position().clone();
        if self.rules.side_to_move(&base)? != side {
            return Ok(LocalMove::Refused(Refusal::NotYourTurn));
        }

        let destinations = self.rules.legal_moves(&base, attempt.from)?;
        let Some(destination) = destinations.iter().find(|d| d.to == attempt.to) else {
            trace!(from = %attempt.from, to = %attempt.to, "refused illegal move");
            return Ok(LocalMove::Refused(Refusal::IllegalMove));
        };
        let promotion = if destination.promotion_eligible {
            Some(attempt.promotion_hint.unwrap_or(PromotionPiece::Queen))
        } else {
            None
        };
        let notation = MoveNotation::new(attempt.from, attempt.to, promotion);

        let position = match self.rules.apply_move(&base, &notation) {
            Ok(position) => position,
            Err(RulesError::IllegalMove(_)) => return Ok(LocalMove::Refused(Refusal::IllegalMove)),
            Err(e) => return Err(e.into()),
        };

        debug!(notation = %notation, "local move applied optimistically");
        self.phase = Phase::Optimistic {
            attempt: attempt.with_promotion(promotion),
            notation: notation.clone(),
            position: position.clone(),
        };
        Ok(LocalMove::Accepted { notation, position })
    }

    /// Applies the position the server returned for the in-flight move.
    pub fn acknowledge(&mut self, position: &Position) -> RemoteMove {
        let outcome = self.observe(None, position);
        trace!(?outcome, "acknowledgment reconciled");
        outcome
    }

    /// Applies a pushed move and the position it resulted in.
    ///
    /// Redelivery and pushes from earlier in the session are no-ops.
    pub fn confirm_remote(&mut self, notation: &MoveNotation, resulting: &Position) -> RemoteMove {
        let outcome = self.observe(Some(notation), resulting);
        trace!(notation = %notation, ?outcome, "push reconciled");
        outcome
    }

    /// Discards any in-flight move and adopts the authoritative `position`.
    pub fn rollback_to(&mut self, position: Position) {
        if let Phase::Optimistic { notation, .. } = &self.phase {
            debug!(notation = %notation, "rolling back local move");
        }
        self.phase = Phase::Idle;
        match self.timeline.iter().position(|p| *p == position) {
            Some(index) => self.timeline.truncate(index + 1),
            None => self.timeline.push(position),
        }
    }

    /// Returns to the last authoritative position if a move is in flight.
    pub fn abandon_pending(&mut self) -> bool {
        if self.is_idle() {
            return false;
        }
        debug!("abandoning in-flight move");
        self.phase = Phase::Idle;
        true
    }

    fn adopt(&mut self, position: &Position) {
        self.phase = Phase::Idle;
        self.timeline.push(position.clone());
    }

    fn observe(&mut self, notation: Option<&MoveNotation>, resulting: &Position) -> RemoteMove {
        if let Phase::Optimistic { position, .. } = &self.phase {
            if position == resulting {
                self.adopt(resulting);
                return RemoteMove::Confirmed;
            }
        }
        if resulting == self.authoritative_position() {
            return RemoteMove::Duplicate;
        }
        if self.timeline.contains(resulting) {
            return RemoteMove::Stale;
        }

        if let Phase::Optimistic { notation: pending, .. } = &self.phase {
            warn!(pending = %pending, "server position diverged from in-flight move");
            self.adopt(resulting);
            return RemoteMove::Resynced;
        }

        let follows = notation.is_some_and(|notation| {
            self.rules
                .apply_move(self.authoritative_position(), notation)
                .is_ok_and(|next| next == *resulting)
        });
        self.adopt(resulting);
        if follows {
            RemoteMove::CaughtUp
        } else {
            debug!("pushed position does not follow from held position, resynced");
            RemoteMove::Resynced
        }
    }
}

impl std::fmt::Debug for MoveReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoveReconciler")
            .field("local_side", &self.local_side)
            .field("authoritative", self.authoritative_position())
            .field("phase", &self.phase)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_protocol::SessionId;
    use gambit_rules::ChessRules;
    use proptest::prelude::*;

    fn rules() -> Arc<dyn RulesEngine> {
        Arc::new(ChessRules::new())
    }

    fn attempt(from: &str, to: &str) -> MoveAttempt {
        MoveAttempt::new(
            SessionId(1),
            from.parse().unwrap(),
            to.parse().unwrap(),
            None,
        )
    }

    fn after(position: &Position, moves: &[&str]) -> Position {
        let rules = ChessRules::new();
        moves.iter().fold(position.clone(), |p, m| {
            rules.apply_move(&p, &MoveNotation::parse(m).unwrap()).unwrap()
        })
    }

    #[test]
    fn accepted_move_matches_rules_engine() {
        let mut reconciler = MoveReconciler::new(rules(), Some(Side::White), Position::start());
        let result = reconciler.apply_local(attempt("e2", "e4")).unwrap();

        let expected = after(&Position::start(), &["e2e4"]);
        assert_eq!(
            result,
            LocalMove::Accepted {
                notation: MoveNotation::parse("e2e4").unwrap(),
                position: expected.clone(),
            }
        );
        assert_eq!(reconciler.current_position(), &expected);
        assert_eq!(reconciler.authoritative_position(), &Position::start());
        assert!(reconciler.pending().is_some());
    }

    #[test]
    fn refuses_out_of_turn_without_mutation() {
        let black_to_move = after(&Position::start(), &["e2e4"]);
        let mut reconciler = MoveReconciler::new(rules(), Some(Side::White), black_to_move.clone());

        let result = reconciler.apply_local(attempt("d2", "d4")).unwrap();
        assert_eq!(result, LocalMove::Refused(Refusal::NotYourTurn));
        assert_eq!(reconciler.current_position(), &black_to_move);
        assert!(reconciler.is_idle());
    }

    #[test]
    fn refuses_illegal_second_and_spectator_moves() {
        let mut reconciler = MoveReconciler::new(rules(), Some(Side::White), Position::start());
        assert_eq!(
            reconciler.apply_local(attempt("e2", "e5")).unwrap(),
            LocalMove::Refused(Refusal::IllegalMove)
        );
        assert!(reconciler.apply_local(attempt("e2", "e4")).unwrap().is_accepted());
        assert_eq!(
            reconciler.apply_local(attempt("d2", "d4")).unwrap(),
            LocalMove::Refused(Refusal::MovePending)
        );

        let mut spectator = MoveReconciler::new(rules(), None, Position::start());
        assert_eq!(
            spectator.apply_local(attempt("e2", "e4")).unwrap(),
            LocalMove::Refused(Refusal::Spectator)
        );
    }

    #[test]
    fn promotion_defaults_to_queen() {
        let position = Position::new("8/P6k/8/8/8/8/8/K7 w - - 0 1");
        let mut reconciler = MoveReconciler::new(rules(), Some(Side::White), position);

        let result = reconciler.apply_local(attempt("a7", "a8")).unwrap();
        let LocalMove::Accepted { notation, .. } = result else {
            panic!("expected accepted move");
        };
        assert_eq!(notation.to_string(), "a7a8q");
        assert_eq!(
            reconciler.pending().and_then(|a| a.promotion_hint),
            Some(PromotionPiece::Queen)
        );
    }

    #[test]
    fn promotion_hint_dropped_for_ordinary_moves() {
        let mut reconciler = MoveReconciler::new(rules(), Some(Side::White), Position::start());
        let result = reconciler
            .apply_local(attempt("e2", "e4").with_promotion(Some(PromotionPiece::Knight)))
            .unwrap();
        let LocalMove::Accepted { notation, .. } = result else {
            panic!("expected accepted move");
        };
        assert_eq!(notation.to_string(), "e2e4");
    }

    #[test]
    fn confirmation_in_either_order_is_the_same() {
        let expected = after(&Position::start(), &["e2e4"]);
        let notation = MoveNotation::parse("e2e4").unwrap();

        let mut ack_first = MoveReconciler::new(rules(), Some(Side::White), Position::start());
        ack_first.apply_local(attempt("e2", "e4")).unwrap();
        assert_eq!(ack_first.acknowledge(&expected), RemoteMove::Confirmed);
        assert_eq!(ack_first.confirm_remote(&notation, &expected), RemoteMove::Duplicate);

        let mut push_first = MoveReconciler::new(rules(), Some(Side::White), Position::start());
        push_first.apply_local(attempt("e2", "e4")).unwrap();
        assert_eq!(push_first.confirm_remote(&notation, &expected), RemoteMove::Confirmed);
        assert_eq!(push_first.acknowledge(&expected), RemoteMove::Duplicate);

        assert_eq!(ack_first.current_position(), push_first.current_position());
        assert!(ack_first.is_idle() && push_first.is_idle());
    }

    #[test]
    fn opponent_push_catches_up_and_redelivery_is_noop() {
        let white_moved = after(&Position::start(), &["e2e4"]);
        let mut reconciler = MoveReconciler::new(rules(), Some(Side::Black), white_moved.clone());
        let reply = MoveNotation::parse("e7e5").unwrap();
        let resulting = after(&white_moved, &["e7e5"]);

        assert_eq!(reconciler.confirm_remote(&reply, &resulting), RemoteMove::CaughtUp);
        assert_eq!(reconciler.confirm_remote(&reply, &resulting), RemoteMove::Duplicate);
        assert_eq!(reconciler.current_position(), &resulting);
    }

    #[test]
    fn stale_push_is_ignored() {
        let mut reconciler = MoveReconciler::new(rules(), Some(Side::Black), Position::start());
        let first = after(&Position::start(), &["e2e4"]);
        let second = after(&first, &["e7e5"]);
        reconciler.confirm_remote(&MoveNotation::parse("e2e4").unwrap(), &first);
        reconciler.confirm_remote(&MoveNotation::parse("e7e5").unwrap(), &second);

        let outcome = reconciler.confirm_remote(&MoveNotation::parse("e2e4").unwrap(), &first);
        assert_eq!(outcome, RemoteMove::Stale);
        assert_eq!(reconciler.current_position(), &second);
    }

    #[test]
    fn mismatched_push_lands_on_server_position() {
        let mut reconciler = MoveReconciler::new(rules(), Some(Side::Black), Position::start());
        let server = after(&Position::start(), &["d2d4"]);

        let outcome = reconciler.confirm_remote(&MoveNotation::parse("e2e4").unwrap(), &server);
        assert_eq!(outcome, RemoteMove::Resynced);
        assert_eq!(reconciler.current_position(), &server);
    }

    #[test]
    fn divergent_position_replaces_optimistic_move() {
        let mut reconciler = MoveReconciler::new(rules(), Some(Side::White), Position::start());
        reconciler.apply_local(attempt("e2", "e4")).unwrap();
        let server = after(&Position::start(), &["d2d4"]);

        assert_eq!(reconciler.acknowledge(&server), RemoteMove::Resynced);
        assert!(reconciler.is_idle());
        assert_eq!(reconciler.current_position(), &server);
    }

    #[test]
    fn rollback_restores_authoritative_snapshot() {
        let mut reconciler = MoveReconciler::new(rules(), Some(Side::White), Position::start());
        reconciler.apply_local(attempt("e2", "e4")).unwrap();
        reconciler.rollback_to(Position::start());

        assert!(reconciler.is_idle());
        assert_eq!(reconciler.current_position(), &Position::start());
        assert!(reconciler.apply_local(attempt("d2", "d4")).unwrap().is_accepted());
    }

    #[test]
    fn abandon_returns_to_authoritative() {
        let mut reconciler = MoveReconciler::new(rules(), Some(Side::White), Position::start());
        assert!(!reconciler.abandon_pending());
        reconciler.apply_local(attempt("g1", "f3")).unwrap();
        assert!(reconciler.abandon_pending());
        assert_eq!(reconciler.current_position(), &Position::start());
    }

    /// Plays `choices` as indices into the legal move list, both sides.
    fn random_line(choices: &[usize]) -> Vec<(MoveNotation, Position)> {
        let rules = ChessRules::new();
        let mut position = Position::start();
        let mut line = Vec::new();
        for choice in choices {
            let mut moves = Vec::new();
            for file in 0..8 {
                for rank in 0..8 {
                    let from = Square::from_coords(file, rank).unwrap();
                    for d in rules.legal_moves(&position, from).unwrap() {
                        let promotion = d.promotion_eligible.then_some(PromotionPiece::Queen);
                        moves.push(MoveNotation::new(from, d.to, promotion));
                    }
                }
            }
            if moves.is_empty() {
                break;
            }
            let notation = moves[choice % moves.len()].clone();
            position = rules.apply_move(&position, &notation).unwrap();
            line.push((notation, position.clone()));
        }
        line
    }

    proptest! {
        #[test]
        fn redelivery_is_idempotent(choices in prop::collection::vec(0usize..64, 1..24)) {
            let line = random_line(&choices);
            let mut once = MoveReconciler::new(rules(), None, Position::start());
            let mut twice = MoveReconciler::new(rules(), None, Position::start());
            for (notation, position) in &line {
                once.confirm_remote(notation, position);
                twice.confirm_remote(notation, position);
                twice.confirm_remote(notation, position);
            }
            prop_assert_eq!(once.current_position(), twice.current_position());
        }

        #[test]
        fn local_moves_confirm_in_any_order(
            choices in prop::collection::vec(0usize..64, 1..24),
            push_first in prop::collection::vec(any::<bool>(), 24),
        ) {
            let line = random_line(&choices);
            let mut ordered = MoveReconciler::new(rules(), Some(Side::White), Position::start());
            let mut mixed = MoveReconciler::new(rules(), Some(Side::White), Position::start());
            for (ply, (notation, position)) in line.iter().enumerate() {
                if ply % 2 == 0 {
                    let local = MoveAttempt::new(
                        SessionId(1),
                        notation.from(),
                        notation.to(),
                        notation.promotion(),
                    );
                    prop_assert!(ordered.apply_local(local.clone()).unwrap().is_accepted());
                    prop_assert!(mixed.apply_local(local).unwrap().is_accepted());

                    ordered.acknowledge(position);
                    ordered.confirm_remote(notation, position);
                    if push_first[ply] {
                        mixed.confirm_remote(notation, position);
                        mixed.acknowledge(position);
                    } else {
                        mixed.acknowledge(position);
                        mixed.confirm_remote(notation, position);
                    }
                } else {
                    ordered.confirm_remote(notation, position);
                    mixed.confirm_remote(notation, position);
                }
                prop_assert_eq!(ordered.current_position(), position);
                prop_assert_eq!(mixed.current_position(), position);
            }
        }
    }
}
