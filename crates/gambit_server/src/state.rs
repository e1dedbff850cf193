//! Authoritative records held by the server.

use crate::rooms::Rooms;
use gambit_protocol::{
    ChallengeId, GameSnapshot, MoveNotation, ParticipantId, Position, SessionId, Side,
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub username: String,
    pub access_epoch: u64,
    pub refresh_epoch: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct GameRecord {
    pub id: SessionId,
    pub white: ParticipantId,
    pub black: ParticipantId,
    pub position: Position,
    pub in_progress: bool,
    pub winner: Option<ParticipantId>,
    pub draw_offer_from: Option<ParticipantId>,
    pub white_clock: i64,
    pub black_clock: i64,
    /// Server time of the last move, or of creation.
    pub updated_at: i64,
    pub moves: Vec<MoveNotation>,
}

impl GameRecord {
    pub fn new(
        id: SessionId,
        white: ParticipantId,
        black: ParticipantId,
        position: Position,
        clock: i64,
        now: i64,
    ) -> Self {
        Self {
            id,
            white,
            black,
            position,
            in_progress: true,
            winner: None,
            draw_offer_from: None,
            white_clock: clock,
            black_clock: clock,
            updated_at: now,
            moves: Vec::new(),
        }
    }

    pub fn side_of(&self, participant: ParticipantId) -> Option<Side> {
        if participant == self.white {
            Some(Side::White)
        } else if participant == self.black {
            Some(Side::Black)
        } else {
            None
        }
    }

    pub fn participant(&self, side: Side) -> ParticipantId {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }

    pub fn involves(&self, participant: ParticipantId) -> bool {
        self.side_of(participant).is_some()
    }

    pub fn clock(&self, side: Side) -> i64 {
        match side {
            Side::White => self.white_clock,
            Side::Black => self.black_clock,
        }
    }

    /// Charges time elapsed since the last move to `side`.
    pub fn charge_clock(&mut self, side: Side, now: i64) {
        let elapsed = (now - self.updated_at).max(0);
        let clock = match side {
            Side::White => &mut self.white_clock,
            Side::Black => &mut self.black_clock,
        };
        *clock = (*clock - elapsed).max(0);
        self.updated_at = now;
    }

    pub fn finish(&mut self, winner: Option<ParticipantId>) {
        self.in_progress = false;
        self.winner = winner;
        self.draw_offer_from = None;
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            id: self.id,
            in_progress: self.in_progress,
            current_fen: self.position.clone(),
            white_user_id: self.white,
            black_user_id: self.black,
            white_time_left: Some(self.white_clock),
            black_time_left: Some(self.black_clock),
            winner_id: self.winner,
            draw_offer_from: self.draw_offer_from,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ChallengeRecord {
    pub id: ChallengeId,
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub created_at: i64,
}

#[derive(Default)]
pub(crate) struct ServerState {
    pub users: HashMap<ParticipantId, UserRecord>,
    pub games: BTreeMap<SessionId, GameRecord>,
    /// Oldest first.
    pub queue: Vec<ParticipantId>,
    pub challenges: BTreeMap<ChallengeId, ChallengeRecord>,
    pub rooms: Rooms,
    next_user: i64,
    next_game: i64,
    next_challenge: i64,
}

impl ServerState {
    pub fn next_user_id(&mut self) -> ParticipantId {
        self.next_user += 1;
        ParticipantId(self.next_user)
    }

    pub fn next_game_id(&mut self) -> SessionId {
        self.next_game += 1;
        SessionId(self.next_game)
    }

    pub fn next_challenge_id(&mut self) -> ChallengeId {
        self.next_challenge += 1;
        ChallengeId(self.next_challenge)
    }

    pub fn username(&self, participant: ParticipantId) -> String {
        self.users
            .get(&participant)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn ongoing_game(&self, participant: ParticipantId) -> Option<&GameRecord> {
        self.games
            .values()
            .find(|g| g.in_progress && g.involves(participant))
    }

    pub fn in_queue(&self, participant: ParticipantId) -> bool {
        self.queue.contains(&participant)
    }

    /// Drops challenges older than `ttl` seconds.
    pub fn purge_challenges(&mut self, now: i64, ttl: Option<i64>) -> Vec<ChallengeId> {
        let Some(ttl) = ttl else {
            return Vec::new();
        };
        let expired: Vec<ChallengeId> = self
            .challenges
            .values()
            .filter(|c| now - c.created_at >= ttl)
            .map(|c| c.id)
            .collect();
        for id in &expired {
            self.challenges.remove(id);
        }
        expired
    }
}
