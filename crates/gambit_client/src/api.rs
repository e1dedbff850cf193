//! Request/response fallback surface.
//!
//! [`GameApi`] is the blocking request/response half of the protocol. The
//! production implementation is [`HttpGameApi`](crate::HttpGameApi); tests can
//! use [`MockApi`].

use crate::error::{ClientError, ClientResult};
use gambit_protocol::{
    ChallengeDecision, ChallengeId, Endpoint, GameSnapshot, JoinQueueResponse, MoveNotation,
    ParticipantId, PendingChallenge, QueueStatusResponse, RespondChallengeResponse,
    SendChallengeResponse, SessionId,
};
use parking_lot::Mutex;

/// Request/response operations used by the session, queue and challenge clients.
pub trait GameApi: Send + Sync {
    /// Fetches the authoritative session snapshot.
    fn fetch_session(&self, session: SessionId) -> ClientResult<GameSnapshot>;

    /// Submits a move. The answer is the snapshot after the move.
    fn submit_move(&self, session: SessionId, notation: &MoveNotation)
        -> ClientResult<GameSnapshot>;

    /// Resigns the session.
    fn resign(&self, session: SessionId) -> ClientResult<()>;

    /// Offers a draw.
    fn offer_draw(&self, session: SessionId) -> ClientResult<()>;

    /// Accepts or declines the opponent's draw offer.
    fn respond_draw(&self, session: SessionId, accepted: bool) -> ClientResult<()>;

    /// Claims a win because the opponent's clock ran out.
    fn claim_timeout(&self, session: SessionId) -> ClientResult<()>;

    /// Joins the pairing queue.
    fn join_queue(&self) -> ClientResult<JoinQueueResponse>;

    /// Leaves the pairing queue.
    fn leave_queue(&self) -> ClientResult<()>;

    /// Polls pairing status.
    fn queue_status(&self) -> ClientResult<QueueStatusResponse>;

    /// Challenges `to` on behalf of `from`.
    fn send_challenge(
        &self,
        from: ParticipantId,
        to: ParticipantId,
    ) -> ClientResult<SendChallengeResponse>;

    /// Cancels the outgoing challenge.
    fn cancel_challenge(&self) -> ClientResult<()>;

    /// Lists challenges received and still open.
    fn pending_challenges(&self) -> ClientResult<Vec<PendingChallenge>>;

    /// Accepts or declines a received challenge.
    fn respond_challenge(
        &self,
        challenge: ChallengeId,
        decision: ChallengeDecision,
    ) -> ClientResult<RespondChallengeResponse>;
}

#[derive(Default)]
struct MockResponses {
    snapshot: Option<ClientResult<GameSnapshot>>,
    submit: Option<ClientResult<GameSnapshot>>,
    action: Option<ClientResult<()>>,
    join: Option<ClientResult<JoinQueueResponse>>,
    leave: Option<ClientResult<()>>,
    status: Option<ClientResult<QueueStatusResponse>>,
    send: Option<ClientResult<SendChallengeResponse>>,
    pending: Option<ClientResult<Vec<PendingChallenge>>>,
    respond: Option<ClientResult<RespondChallengeResponse>>,
}

/// A mock API for testing.
///
/// Responses are sticky: each one is returned until replaced. Calls that
/// return `()` succeed unless told otherwise.
#[derive(Default)]
pub struct MockApi {
    responses: Mutex<MockResponses>,
    calls: Mutex<Vec<Endpoint>>,
    draw_answers: Mutex<Vec<bool>>,
    challenges_sent: Mutex<Vec<(ParticipantId, ParticipantId)>>,
}

fn unset(what: &str) -> ClientError {
    ClientError::transport_fatal(format!("no mock {what} response set"))
}

impl MockApi {
    /// Creates a new mock API.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the snapshot response.
    pub fn set_snapshot_response(&self, response: ClientResult<GameSnapshot>) {
        self.responses.lock().snapshot = Some(response);
    }

    /// Sets the move submission response.
    pub fn set_submit_response(&self, response: ClientResult<GameSnapshot>) {
        self.responses.lock().submit = Some(response);
    }

    /// Sets the response for resign, draw and timeout calls.
    pub fn set_action_response(&self, response: ClientResult<()>) {
        self.responses.lock().action = Some(response);
    }

    /// Sets the join-queue response.
    pub fn set_join_response(&self, response: ClientResult<JoinQueueResponse>) {
        self.responses.lock().join = Some(response);
    }

    /// Sets the leave-queue response.
    pub fn set_leave_response(&self, response: ClientResult<()>) {
        self.responses.lock().leave = Some(response);
    }

    /// Sets the queue-status response.
    pub fn set_status_response(&self, response: ClientResult<QueueStatusResponse>) {
        self.responses.lock().status = Some(response);
    }

    /// Sets the send-challenge response.
    pub fn set_send_challenge_response(&self, response: ClientResult<SendChallengeResponse>) {
        self.responses.lock().send = Some(response);
    }

    /// Sets the pending-challenges response.
    pub fn set_pending_response(&self, response: ClientResult<Vec<PendingChallenge>>) {
        self.responses.lock().pending = Some(response);
    }

    /// Sets the respond-challenge response.
    pub fn set_respond_challenge_response(
        &self,
        response: ClientResult<RespondChallengeResponse>,
    ) {
        self.responses.lock().respond = Some(response);
    }

    /// Endpoints called so far, in order.
    pub fn calls(&self) -> Vec<Endpoint> {
        self.calls.lock().clone()
    }

    /// Number of calls to `endpoint`.
    pub fn call_count(&self, endpoint: &Endpoint) -> usize {
        self.calls.lock().iter().filter(|c| *c == endpoint).count()
    }

    /// Answers given to draw offers, in order.
    pub fn draw_answers(&self) -> Vec<bool> {
        self.draw_answers.lock().clone()
    }

    /// `(from, to)` pairs of challenges sent.
    pub fn challenges_sent(&self) -> Vec<(ParticipantId, ParticipantId)> {
        self.challenges_sent.lock().clone()
    }

    fn record(&self, endpoint: Endpoint) {
        self.calls.lock().push(endpoint);
    }
}

impl GameApi for MockApi {
    fn fetch_session(&self, session: SessionId) -> ClientResult<GameSnapshot> {
        self.record(Endpoint::Snapshot(session));
        self.responses
            .lock()
            .snapshot
            .clone()
            .unwrap_or_else(|| Err(unset("snapshot")))
    }

    fn submit_move(
        &self,
        session: SessionId,
        notation: &MoveNotation,
    ) -> ClientResult<GameSnapshot> {
        self.record(Endpoint::SubmitMove(session, notation.clone()));
        self.responses
            .lock()
            .submit
            .clone()
            .unwrap_or_else(|| Err(unset("submit")))
    }

    fn resign(&self, session: SessionId) -> ClientResult<()> {
        self.record(Endpoint::Resign(session));
        self.responses.lock().action.clone().unwrap_or(Ok(()))
    }

    fn offer_draw(&self, session: SessionId) -> ClientResult<()> {
        self.record(Endpoint::OfferDraw(session));
        self.responses.lock().action.clone().unwrap_or(Ok(()))
    }

    fn respond_draw(&self, session: SessionId, accepted: bool) -> ClientResult<()> {
        self.record(Endpoint::RespondDraw(session));
        self.draw_answers.lock().push(accepted);
        self.responses.lock().action.clone().unwrap_or(Ok(()))
    }

    fn claim_timeout(&self, session: SessionId) -> ClientResult<()> {
        self.record(Endpoint::ClaimTimeout(session));
        self.responses.lock().action.clone().unwrap_or(Ok(()))
    }

    fn join_queue(&self) -> ClientResult<JoinQueueResponse> {
        self.record(Endpoint::JoinQueue);
        self.responses
            .lock()
            .join
            .clone()
            .unwrap_or_else(|| Err(unset("join")))
    }

    fn leave_queue(&self) -> ClientResult<()> {
        self.record(Endpoint::LeaveQueue);
        self.responses.lock().leave.clone().unwrap_or(Ok(()))
    }

    fn queue_status(&self) -> ClientResult<QueueStatusResponse> {
        self.record(Endpoint::QueueStatus);
        self.responses
            .lock()
            .status
            .clone()
            .unwrap_or_else(|| Err(unset("status")))
    }

    fn send_challenge(
        &self,
        from: ParticipantId,
        to: ParticipantId,
    ) -> ClientResult<SendChallengeResponse> {
        self.record(Endpoint::SendChallenge);
        self.challenges_sent.lock().push((from, to));
        self.responses
            .lock()
            .send
            .clone()
            .unwrap_or_else(|| Err(unset("send challenge")))
    }

    fn cancel_challenge(&self) -> ClientResult<()> {
        self.record(Endpoint::CancelChallenge);
        self.responses.lock().action.clone().unwrap_or(Ok(()))
    }

    fn pending_challenges(&self) -> ClientResult<Vec<PendingChallenge>> {
        self.record(Endpoint::PendingChallenges);
        self.responses
            .lock()
            .pending
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn respond_challenge(
        &self,
        challenge: ChallengeId,
        decision: ChallengeDecision,
    ) -> ClientResult<RespondChallengeResponse> {
        self.record(Endpoint::RespondChallenge(challenge, decision));
        self.responses
            .lock()
            .respond
            .clone()
            .unwrap_or_else(|| Err(unset("respond challenge")))
    }
}
