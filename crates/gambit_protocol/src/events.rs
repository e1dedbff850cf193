//! Channel event names and payloads.
//!
//! Payload keys follow the wire format exactly (`gameId`, `userId`,
//! `current_fen`, ...). Optional `game_id` fields let a client that follows
//! more than one room discard pushes meant for another session.

use crate::board::{MoveNotation, Position, Side};
use crate::codec::decode_payload;
use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{ChallengeId, ParticipantId, SessionId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Event names used on the channel.
pub mod names {
    /// Outbound: join a game room.
    pub const JOIN_GAME: &str = "join_game";
    /// Outbound: leave a game room.
    pub const LEAVE_GAME: &str = "leave_game";
    /// Outbound: announce presence for the authenticated participant.
    pub const REGISTER_USER: &str = "register_user";
    /// Inbound: a move was accepted by the server.
    pub const MOVE_MADE: &str = "move_made";
    /// Inbound: the game ended.
    pub const GAME_OVER: &str = "game_over";
    /// Inbound: a draw was offered.
    pub const DRAW_OFFERED: &str = "draw_offered";
    /// Inbound: a draw offer was declined.
    pub const DRAW_DECLINED: &str = "draw_declined";
    /// Inbound: the queue paired this participant.
    pub const START_GAME: &str = "start_game";
    /// Inbound: a friend challenged this participant.
    pub const CHALLENGE_INVITE: &str = "friend_challenge_invite";
    /// Inbound: a challenge was accepted and a game created.
    pub const START_CHALLENGE: &str = "start_challenge";
}

/// `join_game` / `leave_game` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRoom {
    /// Session whose room to join or leave.
    #[serde(rename = "gameId")]
    pub game_id: SessionId,
}

/// `register_user` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// Participant announcing presence.
    #[serde(rename = "userId")]
    pub user_id: ParticipantId,
}

/// `move_made` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveMade {
    /// The move the server applied.
    #[serde(rename = "move")]
    pub notation: MoveNotation,
    /// Position after the move.
    pub current_fen: Position,
    /// Whether the move ended the game.
    #[serde(default)]
    pub is_game_over: bool,
    /// White clock in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_time_left: Option<i64>,
    /// Black clock in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_time_left: Option<i64>,
    /// Session the move belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<SessionId>,
}

/// Why a game ended.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GameOverReason {
    /// A player resigned.
    Resignation,
    /// Checkmate.
    Checkmate,
    /// Stalemate.
    Stalemate,
    /// Rules draw other than stalemate.
    Draw,
    /// Both players agreed to a draw.
    DrawAgreement,
    /// A clock ran out.
    TimeOut,
    /// Neither side can mate.
    InsufficientMaterial,
    /// A player disconnected and forfeited.
    Disconnection,
    /// Any reason tag this client does not know.
    Other(String),
}

impl GameOverReason {
    /// Parses a wire tag. Unknown tags are preserved as `Other`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "resignation" => Self::Resignation,
            "checkmate" => Self::Checkmate,
            "stalemate" => Self::Stalemate,
            "draw" => Self::Draw,
            "draw_agreement" => Self::DrawAgreement,
            "time_out" | "Time out" => Self::TimeOut,
            "insufficient_material" | "Draw due to insufficient material" => {
                Self::InsufficientMaterial
            }
            "disconnection" => Self::Disconnection,
            other => Self::Other(other.to_string()),
        }
    }

    /// Canonical wire tag.
    pub fn tag(&self) -> &str {
        match self {
            Self::Resignation => "resignation",
            Self::Checkmate => "checkmate",
            Self::Stalemate => "stalemate",
            Self::Draw => "draw",
            Self::DrawAgreement => "draw_agreement",
            Self::TimeOut => "time_out",
            Self::InsufficientMaterial => "insufficient_material",
            Self::Disconnection => "disconnection",
            Self::Other(tag) => tag,
        }
    }

    /// Whether this reason ends the game without a winner.
    pub fn is_drawish(&self) -> bool {
        matches!(
            self,
            Self::Stalemate | Self::Draw | Self::DrawAgreement | Self::InsufficientMaterial
        )
    }
}

impl fmt::Display for GameOverReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for GameOverReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for GameOverReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// `game_over` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOver {
    /// Winner, absent for a draw.
    #[serde(default)]
    pub winner_id: Option<ParticipantId>,
    /// Reason tag.
    pub reason: GameOverReason,
    /// Session that ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<SessionId>,
}

/// `draw_offered` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawOffered {
    /// Participant who offered.
    pub offerer_id: ParticipantId,
    /// Session the offer belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<SessionId>,
}

/// `draw_declined` payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawDeclined {
    /// Session the offer belonged to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<SessionId>,
}

/// `start_game` payload, sent when the queue pairs two participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePairing {
    /// New session.
    pub game_id: SessionId,
    /// Opponent's participant id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent: Option<ParticipantId>,
    /// Side assigned to the receiver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Side>,
}

/// `friend_challenge_invite` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeInvite {
    /// Challenge identifier.
    pub challenge_id: ChallengeId,
    /// Display name of the challenger.
    pub username: String,
    /// Challenger's participant id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<ParticipantId>,
}

/// `start_challenge` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeStart {
    /// New session.
    pub game_id: SessionId,
    /// Challenge that was accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<ChallengeId>,
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// `move_made`.
    MoveMade(MoveMade),
    /// `game_over`.
    GameOver(GameOver),
    /// `draw_offered`.
    DrawOffered(DrawOffered),
    /// `draw_declined`.
    DrawDeclined(DrawDeclined),
    /// `start_game`.
    StartGame(QueuePairing),
    /// `friend_challenge_invite`.
    ChallengeInvite(ChallengeInvite),
    /// `start_challenge`.
    StartChallenge(ChallengeStart),
}

impl ServerEvent {
    /// Decodes a named inbound event.
    pub fn decode(name: &str, payload: &Value) -> ProtocolResult<Self> {
        Ok(match name {
            names::MOVE_MADE => Self::MoveMade(decode_payload(payload)?),
            names::GAME_OVER => Self::GameOver(decode_payload(payload)?),
            names::DRAW_OFFERED => Self::DrawOffered(decode_payload(payload)?),
            names::DRAW_DECLINED => Self::DrawDeclined(decode_payload(payload)?),
            names::START_GAME => Self::StartGame(decode_payload(payload)?),
            names::CHALLENGE_INVITE => Self::ChallengeInvite(decode_payload(payload)?),
            names::START_CHALLENGE => Self::StartChallenge(decode_payload(payload)?),
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        })
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MoveMade(_) => names::MOVE_MADE,
            Self::GameOver(_) => names::GAME_OVER,
            Self::DrawOffered(_) => names::DRAW_OFFERED,
            Self::DrawDeclined(_) => names::DRAW_DECLINED,
            Self::StartGame(_) => names::START_GAME,
            Self::ChallengeInvite(_) => names::CHALLENGE_INVITE,
            Self::StartChallenge(_) => names::START_CHALLENGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn move_made_uses_wire_keys() {
        let payload = json!({
            "move": "e2e4",
            "current_fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
            "is_game_over": false,
            "white_time_left": 598,
            "black_time_left": 600
        });
        let event = ServerEvent::decode(names::MOVE_MADE, &payload).unwrap();
        let ServerEvent::MoveMade(made) = event else {
            panic!("expected move_made");
        };
        assert_eq!(made.notation.to_string(), "e2e4");
        assert_eq!(made.white_time_left, Some(598));
        assert_eq!(made.game_id, None);
    }

    #[test]
    fn game_over_reason_tags() {
        let payload = json!({"winner_id": null, "reason": "Draw due to insufficient material"});
        let over: GameOver = decode_payload(&payload).unwrap();
        assert_eq!(over.reason, GameOverReason::InsufficientMaterial);
        assert!(over.winner_id.is_none());
        assert!(over.reason.is_drawish());

        assert_eq!(GameOverReason::from_tag("Time out"), GameOverReason::TimeOut);
        assert_eq!(
            GameOverReason::from_tag("abandoned"),
            GameOverReason::Other("abandoned".into())
        );
        assert!(!GameOverReason::Resignation.is_drawish());
    }

    #[test]
    fn room_payload_is_camel_case() {
        let room = GameRoom {
            game_id: SessionId(5),
        };
        assert_eq!(serde_json::to_value(room).unwrap(), json!({"gameId": 5}));

        let presence = Presence {
            user_id: ParticipantId(9),
        };
        assert_eq!(serde_json::to_value(presence).unwrap(), json!({"userId": 9}));
    }

    #[test]
    fn draw_declined_accepts_empty_object() {
        let event = ServerEvent::decode(names::DRAW_DECLINED, &json!({})).unwrap();
        assert_eq!(event, ServerEvent::DrawDeclined(DrawDeclined::default()));
        assert_eq!(event.name(), names::DRAW_DECLINED);
    }

    #[test]
    fn unknown_event_is_an_error() {
        let err = ServerEvent::decode("chat", &json!({})).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownEvent("chat".into()));
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let err = ServerEvent::decode(names::START_CHALLENGE, &json!({"game": 1})).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }
}
