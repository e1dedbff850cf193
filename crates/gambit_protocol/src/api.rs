//! Request/response bodies and the endpoint routing table.

use crate::board::{MoveNotation, Position, Side};
use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{ChallengeId, ParticipantId, SessionId};
use crate::transport::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Response to accepting or declining a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeDecision {
    /// Start a game with the challenger.
    Accept,
    /// Refuse the challenge.
    Decline,
}

impl ChallengeDecision {
    /// Path segment for this decision.
    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeDecision::Accept => "accept",
            ChallengeDecision::Decline => "decline",
        }
    }
}

impl FromStr for ChallengeDecision {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(ChallengeDecision::Accept),
            "decline" => Ok(ChallengeDecision::Decline),
            other => Err(ProtocolError::Decode(format!("invalid decision: {other}"))),
        }
    }
}

impl fmt::Display for ChallengeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every request/response operation the client issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Fetch the authoritative session snapshot.
    Snapshot(SessionId),
    /// Submit a move.
    SubmitMove(SessionId, MoveNotation),
    /// Resign the session.
    Resign(SessionId),
    /// Offer a draw.
    OfferDraw(SessionId),
    /// Answer an open draw offer.
    RespondDraw(SessionId),
    /// Claim a win on time.
    ClaimTimeout(SessionId),
    /// Join the pairing queue.
    JoinQueue,
    /// Leave the pairing queue.
    LeaveQueue,
    /// Poll pairing status.
    QueueStatus,
    /// Challenge another participant.
    SendChallenge,
    /// Cancel this participant's outgoing challenge.
    CancelChallenge,
    /// List challenges received.
    PendingChallenges,
    /// Accept or decline a received challenge.
    RespondChallenge(ChallengeId, ChallengeDecision),
    /// Exchange a refresh token for a new access token.
    Refresh,
}

impl Endpoint {
    /// HTTP method.
    pub fn method(&self) -> Method {
        match self {
            Endpoint::Snapshot(_)
            | Endpoint::QueueStatus
            | Endpoint::PendingChallenges => Method::Get,
            Endpoint::SubmitMove(..) => Method::Put,
            Endpoint::LeaveQueue | Endpoint::CancelChallenge => Method::Delete,
            Endpoint::Resign(_)
            | Endpoint::OfferDraw(_)
            | Endpoint::RespondDraw(_)
            | Endpoint::ClaimTimeout(_)
            | Endpoint::JoinQueue
            | Endpoint::SendChallenge
            | Endpoint::RespondChallenge(..)
            | Endpoint::Refresh => Method::Post,
        }
    }

    /// Request path.
    pub fn path(&self) -> String {
        match self {
            Endpoint::Snapshot(id) => format!("/games/games/{id}"),
            Endpoint::SubmitMove(id, notation) => format!("/games/games/{id}/{notation}"),
            Endpoint::Resign(id) => format!("/games/games/{id}/resign"),
            Endpoint::OfferDraw(id) => format!("/games/games/{id}/offer-draw"),
            Endpoint::RespondDraw(id) => format!("/games/games/{id}/respond-draw"),
            Endpoint::ClaimTimeout(id) => format!("/games/games/{id}/claim-timeout"),
            Endpoint::JoinQueue | Endpoint::LeaveQueue => "/matchmaking/matchmaking".into(),
            Endpoint::QueueStatus => "/matchmaking/status".into(),
            Endpoint::SendChallenge | Endpoint::CancelChallenge => {
                "/challenges/challenges".into()
            }
            Endpoint::PendingChallenges => "/challenges/challenges/pending".into(),
            Endpoint::RespondChallenge(id, decision) => {
                format!("/challenges/respond_challenge/{id}/{decision}")
            }
            Endpoint::Refresh => "/auth/refresh".into(),
        }
    }

    /// Resolves a method and path back to an endpoint.
    pub fn parse(method: Method, path: &str) -> ProtocolResult<Self> {
        let unknown = || ProtocolError::UnknownRoute {
            method: method.to_string(),
            path: path.to_string(),
        };
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        let endpoint = match (method, segments.as_slice()) {
            (Method::Get, ["games", "games", id]) => Endpoint::Snapshot(id.parse().map_err(|_| unknown())?),
            (Method::Post, ["games", "games", id, action]) => {
                let id: SessionId = id.parse().map_err(|_| unknown())?;
                match *action {
                    "resign" => Endpoint::Resign(id),
                    "offer-draw" => Endpoint::OfferDraw(id),
                    "respond-draw" => Endpoint::RespondDraw(id),
                    "claim-timeout" => Endpoint::ClaimTimeout(id),
                    _ => return Err(unknown()),
                }
            }
            (Method::Put, ["games", "games", id, notation]) => Endpoint::SubmitMove(
                id.parse().map_err(|_| unknown())?,
                MoveNotation::parse(notation)?,
            ),
            (Method::Post, ["matchmaking", "matchmaking"]) => Endpoint::JoinQueue,
            (Method::Delete, ["matchmaking", "matchmaking"]) => Endpoint::LeaveQueue,
            (Method::Get, ["matchmaking", "status"]) => Endpoint::QueueStatus,
            (Method::Post, ["challenges", "challenges"]) => Endpoint::SendChallenge,
            (Method::Delete, ["challenges", "challenges"]) => Endpoint::CancelChallenge,
            (Method::Get, ["challenges", "challenges", "pending"]) => Endpoint::PendingChallenges,
            (Method::Post, ["challenges", "respond_challenge", id, decision]) => {
                Endpoint::RespondChallenge(
                    id.parse().map_err(|_| unknown())?,
                    decision.parse().map_err(|_| unknown())?,
                )
            }
            (Method::Post, ["auth", "refresh"]) => Endpoint::Refresh,
            _ => return Err(unknown()),
        };
        Ok(endpoint)
    }
}

/// Authoritative state of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Session id.
    pub id: SessionId,
    /// False once the game has ended.
    pub in_progress: bool,
    /// Current position.
    pub current_fen: Position,
    /// Participant playing white.
    pub white_user_id: ParticipantId,
    /// Participant playing black.
    pub black_user_id: ParticipantId,
    /// White clock in seconds.
    #[serde(default)]
    pub white_time_left: Option<i64>,
    /// Black clock in seconds.
    #[serde(default)]
    pub black_time_left: Option<i64>,
    /// Winner of a finished game.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<ParticipantId>,
    /// Participant with an open draw offer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_offer_from: Option<ParticipantId>,
}

impl GameSnapshot {
    /// Side played by `participant`, if they play in this session.
    pub fn side_of(&self, participant: ParticipantId) -> Option<Side> {
        if participant == self.white_user_id {
            Some(Side::White)
        } else if participant == self.black_user_id {
            Some(Side::Black)
        } else {
            None
        }
    }

    /// Participant playing `side`.
    pub fn participant(&self, side: Side) -> ParticipantId {
        match side {
            Side::White => self.white_user_id,
            Side::Black => self.black_user_id,
        }
    }
}

/// Response to joining the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinQueueResponse {
    /// Human-readable status (`Paired` or `User added to queue`).
    pub message: String,
    /// Session created by an immediate pairing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<SessionId>,
    /// White participant of the new session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_user_id: Option<ParticipantId>,
    /// Black participant of the new session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_user_id: Option<ParticipantId>,
}

/// Response to polling pairing status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    /// Whether an in-progress session exists for the caller.
    pub paired: bool,
    /// The session, when paired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<SessionId>,
    /// White participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_user_id: Option<ParticipantId>,
    /// Black participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_user_id: Option<ParticipantId>,
}

/// Body of a challenge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendChallengeRequest {
    /// Challenger.
    pub user1_id: ParticipantId,
    /// Challenged participant.
    pub user2_id: ParticipantId,
}

/// Response to a challenge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendChallengeResponse {
    /// Human-readable status.
    pub message: String,
    /// Server-issued challenge id.
    pub challenge_id: ChallengeId,
}

/// One entry of the pending-challenges list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChallenge {
    /// Challenge id.
    pub challenge_id: ChallengeId,
    /// Challenger display name.
    pub username: String,
    /// Challenger id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<ParticipantId>,
}

/// Body of a draw response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondDrawRequest {
    /// Accept (true) or decline (false).
    pub accepted: bool,
}

/// Response to accepting or declining a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondChallengeResponse {
    /// Human-readable status.
    pub message: String,
    /// Session created by an accept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<SessionId>,
}

/// Generic `{message}` body used by most acknowledgments and all errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable status.
    pub message: String,
}

impl MessageResponse {
    /// Creates a message body.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response to a token refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// New access token.
    pub access_token: String,
    /// Username of the token holder.
    #[serde(default)]
    pub username: Option<String>,
}

/// A structured failure reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    /// Status code.
    pub status: u16,
    /// Server message.
    pub message: String,
}

impl ApiFailure {
    /// Creates a failure.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400.
    pub fn is_bad_request(&self) -> bool {
        self.status == 400
    }

    /// 401.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// 403.
    pub fn is_forbidden(&self) -> bool {
        self.status == 403
    }

    /// 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_endpoints() -> Vec<Endpoint> {
        let session = SessionId(12);
        vec![
            Endpoint::Snapshot(session),
            Endpoint::SubmitMove(session, MoveNotation::parse("e7e8q").unwrap()),
            Endpoint::Resign(session),
            Endpoint::OfferDraw(session),
            Endpoint::RespondDraw(session),
            Endpoint::ClaimTimeout(session),
            Endpoint::JoinQueue,
            Endpoint::LeaveQueue,
            Endpoint::QueueStatus,
            Endpoint::SendChallenge,
            Endpoint::CancelChallenge,
            Endpoint::PendingChallenges,
            Endpoint::RespondChallenge(ChallengeId(4), ChallengeDecision::Decline),
            Endpoint::Refresh,
        ]
    }

    #[test]
    fn routing_table_resolves_every_endpoint() {
        for endpoint in all_endpoints() {
            let parsed = Endpoint::parse(endpoint.method(), &endpoint.path()).unwrap();
            assert_eq!(parsed, endpoint);
        }
    }

    #[test]
    fn wire_paths() {
        assert_eq!(
            Endpoint::SubmitMove(SessionId(3), MoveNotation::parse("e2e4").unwrap()).path(),
            "/games/games/3/e2e4"
        );
        assert_eq!(
            Endpoint::RespondChallenge(ChallengeId(8), ChallengeDecision::Accept).path(),
            "/challenges/respond_challenge/8/accept"
        );
        assert_eq!(Endpoint::LeaveQueue.method(), Method::Delete);
    }

    #[test]
    fn method_disambiguates_game_actions() {
        // PUT on an action segment is a move attempt, which fails notation parsing.
        assert!(Endpoint::parse(Method::Put, "/games/games/3/resign").is_err());
        assert!(Endpoint::parse(Method::Post, "/games/games/3/e2e4").is_err());
        assert!(Endpoint::parse(Method::Get, "/games/games/x").is_err());
        assert!(Endpoint::parse(Method::Post, "/challenges/respond_challenge/1/maybe").is_err());
    }

    #[test]
    fn snapshot_sides() {
        let snapshot: GameSnapshot = serde_json::from_value(serde_json::json!({
            "id": 1,
            "in_progress": true,
            "current_fen": crate::board::START_POSITION,
            "white_user_id": 10,
            "black_user_id": 20,
            "white_time_left": 600,
            "black_time_left": 600
        }))
        .unwrap();
        assert_eq!(snapshot.side_of(ParticipantId(10)), Some(Side::White));
        assert_eq!(snapshot.side_of(ParticipantId(20)), Some(Side::Black));
        assert_eq!(snapshot.side_of(ParticipantId(30)), None);
        assert_eq!(snapshot.participant(Side::Black), ParticipantId(20));
        assert!(snapshot.draw_offer_from.is_none());
    }

    #[test]
    fn failure_classification() {
        let failure = ApiFailure::new(404, "Game not found");
        assert!(failure.is_not_found());
        assert!(!failure.is_unauthorized());
        assert_eq!(failure.to_string(), "404 Game not found");
    }
}
