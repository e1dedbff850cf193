//! Challenge negotiation client.
//!
//! Sent and received challenges share one active set keyed by the
//! server-issued [`ChallengeId`]. Records leave the set on any terminal
//! transition and are kept in a bounded history for inspection.

use crate::api::GameApi;
use crate::connection::{ConnectionManager, Subscriptions};
use crate::error::{ClientError, ClientResult};
use crate::matchmaking::QueueClient;
use gambit_protocol::{
    decode_payload, names, ChallengeDecision, ChallengeId, ChallengeInvite, ChallengeStart,
    ParticipantId, SessionId,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Who created a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeDirection {
    /// Sent by the local participant.
    Outgoing,
    /// Received by the local participant.
    Incoming,
}

/// Lifecycle of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeStatus {
    /// Waiting for an answer.
    Pending,
    /// Accepted; a session was created.
    Accepted,
    /// Declined by the challenged participant.
    Declined,
    /// Withdrawn by the challenger.
    Cancelled,
    /// No longer known to the server.
    Expired,
}

impl ChallengeStatus {
    /// Whether the challenge can no longer change.
    pub fn is_terminal(self) -> bool {
        self != ChallengeStatus::Pending
    }
}

/// A challenge known to this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    /// Server-issued id.
    pub challenge_id: ChallengeId,
    /// Challenger, when known.
    pub from: Option<ParticipantId>,
    /// Challenged participant, when known.
    pub to: Option<ParticipantId>,
    /// Challenger display name, when the server supplied it.
    pub username: Option<String>,
    /// Direction relative to the local participant.
    pub direction: ChallengeDirection,
    /// Current status.
    pub status: ChallengeStatus,
}

/// Result of [`ChallengeClient::respond`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondOutcome {
    /// Accepted; the server created this session.
    Accepted(Option<SessionId>),
    /// Declined.
    Declined,
    /// The server no longer knew the challenge.
    AlreadyGone,
}

/// Callback for new incoming challenges.
pub type InviteListener = Arc<dyn Fn(&ChallengeRecord) + Send + Sync>;

/// Callback for sessions started by a challenge.
pub type StartListener = Arc<dyn Fn(SessionId) + Send + Sync>;

/// Retired records kept by [`ChallengeClient::history`].
pub const CHALLENGE_HISTORY_LIMIT: usize = 64;

/// Started sessions remembered for deduplication.
const STARTED_LIMIT: usize = 64;

#[derive(Default)]
struct ChallengeSet {
    active: BTreeMap<ChallengeId, ChallengeRecord>,
    history: VecDeque<ChallengeRecord>,
    started: BTreeSet<SessionId>,
}

impl ChallengeSet {
    fn retire(&mut self, id: ChallengeId, status: ChallengeStatus) -> Option<ChallengeRecord> {
        let mut record = self.active.remove(&id)?;
        record.status = status;
        self.history.push_back(record.clone());
        if self.history.len() > CHALLENGE_HISTORY_LIMIT {
            self.history.pop_front();
        }
        Some(record)
    }

    fn mark_started(&mut self, session_id: SessionId) -> bool {
        if !self.started.insert(session_id) {
            return false;
        }
        // Session ids grow, so the smallest is the oldest.
        while self.started.len() > STARTED_LIMIT {
            self.started.pop_first();
        }
        true
    }

    fn outgoing_ids(&self) -> Vec<ChallengeId> {
        self.active
            .values()
            .filter(|r| r.direction == ChallengeDirection::Outgoing)
            .map(|r| r.challenge_id)
            .collect()
    }
}

struct ChallengeInner {
    local: ParticipantId,
    api: Arc<dyn GameApi>,
    set: Mutex<ChallengeSet>,
    queue: RwLock<Option<QueueClient>>,
    invite_listeners: RwLock<Vec<InviteListener>>,
    start_listeners: RwLock<Vec<StartListener>>,
    subscriptions: Mutex<Option<Subscriptions>>,
}

impl ChallengeInner {
    fn invite(&self, invite: ChallengeInvite) -> bool {
        let record = {
            let mut set = self.set.lock();
            if set.active.contains_key(&invite.challenge_id) {
                trace!(challenge_id = %invite.challenge_id, "duplicate invite");
                return false;
            }
            let record = ChallengeRecord {
                challenge_id: invite.challenge_id,
                from: invite.from_user_id,
                to: Some(self.local),
                username: Some(invite.username),
                direction: ChallengeDirection::Incoming,
                status: ChallengeStatus::Pending,
            };
            set.active.insert(record.challenge_id, record.clone());
            record
        };
        info!(challenge_id = %record.challenge_id, from = ?record.from, "challenge received");
        let listeners: Vec<InviteListener> = self.invite_listeners.read().clone();
        for listener in listeners {
            listener(&record);
        }
        true
    }

    fn start(&self, start: ChallengeStart) -> bool {
        let session_id = start.game_id;
        {
            let mut set = self.set.lock();
            if !set.mark_started(session_id) {
                trace!(%session_id, "duplicate challenge start");
                return false;
            }
            match start.challenge_id {
                Some(id) => {
                    set.retire(id, ChallengeStatus::Accepted);
                }
                None => {
                    // Without an id, only a sole outgoing challenge can be attributed.
                    let outgoing = set.outgoing_ids();
                    if let [id] = outgoing.as_slice() {
                        set.retire(*id, ChallengeStatus::Accepted);
                    }
                }
            }
        }
        info!(%session_id, "challenge session starting");
        let listeners: Vec<StartListener> = self.start_listeners.read().clone();
        for listener in listeners {
            listener(session_id);
        }
        true
    }
}

/// Sends, answers and tracks challenges.
#[derive(Clone)]
pub struct ChallengeClient {
    inner: Arc<ChallengeInner>,
}

impl ChallengeClient {
    /// Creates a challenge client for `local` and subscribes to invites and starts.
    pub fn new(local: ParticipantId, api: Arc<dyn GameApi>, connection: &ConnectionManager) -> Self {
        let inner = Arc::new(ChallengeInner {
            local,
            api,
            set: Mutex::new(ChallengeSet::default()),
            queue: RwLock::new(None),
            invite_listeners: RwLock::new(Vec::new()),
            start_listeners: RwLock::new(Vec::new()),
            subscriptions: Mutex::new(None),
        });

        let mut subs = connection.subscriptions();
        let weak = Arc::downgrade(&inner);
        subs.on(names::CHALLENGE_INVITE, move |payload| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match decode_payload::<ChallengeInvite>(payload) {
                Ok(invite) => {
                    inner.invite(invite);
                }
                Err(err) => warn!(error = %err, "dropping malformed invite"),
            }
        });
        let weak = Arc::downgrade(&inner);
        subs.on(names::START_CHALLENGE, move |payload| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match decode_payload::<ChallengeStart>(payload) {
                Ok(start) => {
                    inner.start(start);
                }
                Err(err) => warn!(error = %err, "dropping malformed challenge start"),
            }
        });
        *inner.subscriptions.lock() = Some(subs);

        Self { inner }
    }

    /// Leaves `queue` on a best-effort basis whenever a challenge is accepted.
    pub fn with_queue(self, queue: QueueClient) -> Self {
        *self.inner.queue.write() = Some(queue);
        self
    }

    /// Registers a callback for new incoming challenges.
    pub fn on_invite<F>(&self, listener: F)
    where
        F: Fn(&ChallengeRecord) + Send + Sync + 'static,
    {
        self.inner.invite_listeners.write().push(Arc::new(listener));
    }

    /// Registers a callback for sessions started by a challenge.
    pub fn on_start<F>(&self, listener: F)
    where
        F: Fn(SessionId) + Send + Sync + 'static,
    {
        self.inner.start_listeners.write().push(Arc::new(listener));
    }

    /// Records an incoming challenge. Known ids are ignored.
    pub fn handle_invite(&self, invite: ChallengeInvite) -> bool {
        self.inner.invite(invite)
    }

    /// Reports a session started by a challenge. Repeats are ignored.
    ///
    /// The accepted challenge, when named, is retired as accepted.
    pub fn handle_start(&self, start: ChallengeStart) -> bool {
        self.inner.start(start)
    }

    /// Active challenges, ordered by id.
    pub fn records(&self) -> Vec<ChallengeRecord> {
        self.inner.set.lock().active.values().cloned().collect()
    }

    /// One active challenge.
    pub fn get(&self, id: ChallengeId) -> Option<ChallengeRecord> {
        self.inner.set.lock().active.get(&id).cloned()
    }

    /// Active challenges received by the local participant.
    pub fn incoming(&self) -> Vec<ChallengeRecord> {
        self.by_direction(ChallengeDirection::Incoming)
    }

    /// Active challenges sent by the local participant.
    pub fn outgoing(&self) -> Vec<ChallengeRecord> {
        self.by_direction(ChallengeDirection::Outgoing)
    }

    fn by_direction(&self, direction: ChallengeDirection) -> Vec<ChallengeRecord> {
        self.inner
            .set
            .lock()
            .active
            .values()
            .filter(|r| r.direction == direction)
            .cloned()
            .collect()
    }

    /// Challenges that left the active set, oldest first.
    pub fn history(&self) -> Vec<ChallengeRecord> {
        self.inner.set.lock().history.iter().cloned().collect()
    }

    /// Challenges `target`.
    pub fn send_challenge(&self, target: ParticipantId) -> ClientResult<ChallengeRecord> {
        let response = self.inner.api.send_challenge(self.inner.local, target)?;
        let record = ChallengeRecord {
            challenge_id: response.challenge_id,
            from: Some(self.inner.local),
            to: Some(target),
            username: None,
            direction: ChallengeDirection::Outgoing,
            status: ChallengeStatus::Pending,
        };
        self.inner
            .set
            .lock()
            .active
            .entry(record.challenge_id)
            .or_insert_with(|| record.clone());
        info!(challenge_id = %record.challenge_id, %target, "challenge sent");
        Ok(record)
    }

    /// Accepts or declines a received challenge.
    ///
    /// The record is removed once the server answers, whatever the answer.
    /// A challenge the server no longer knows yields
    /// [`RespondOutcome::AlreadyGone`].
    pub fn respond(
        &self,
        challenge: ChallengeId,
        decision: ChallengeDecision,
    ) -> ClientResult<RespondOutcome> {
        let result = self.inner.api.respond_challenge(challenge, decision);
        let mut set = self.inner.set.lock();
        match result {
            Ok(response) => {
                let (status, outcome) = match decision {
                    ChallengeDecision::Accept => (
                        ChallengeStatus::Accepted,
                        RespondOutcome::Accepted(response.game_id),
                    ),
                    ChallengeDecision::Decline => {
                        (ChallengeStatus::Declined, RespondOutcome::Declined)
                    }
                };
                set.retire(challenge, status);
                drop(set);
                debug!(challenge_id = %challenge, %decision, "challenge answered");
                if decision == ChallengeDecision::Accept {
                    self.leave_queue_best_effort();
                    if let Some(session_id) = response.game_id {
                        self.inner.start(ChallengeStart {
                            game_id: session_id,
                            challenge_id: Some(challenge),
                        });
                    }
                }
                Ok(outcome)
            }
            Err(ClientError::Rejected(failure)) if failure.is_not_found() => {
                set.retire(challenge, ChallengeStatus::Expired);
                debug!(challenge_id = %challenge, "challenge already gone");
                Ok(RespondOutcome::AlreadyGone)
            }
            Err(err @ ClientError::Rejected(_)) => {
                // The server discards the challenge on these refusals too.
                set.retire(challenge, ChallengeStatus::Expired);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Withdraws every outgoing challenge.
    ///
    /// Returns how many records were cancelled.
    pub fn cancel_outgoing(&self) -> ClientResult<usize> {
        self.inner.api.cancel_challenge()?;
        let mut set = self.inner.set.lock();
        let outgoing = set.outgoing_ids();
        for id in &outgoing {
            set.retire(*id, ChallengeStatus::Cancelled);
        }
        Ok(outgoing.len())
    }

    /// Merges the server's list of received challenges.
    ///
    /// Unseen challenges are added (and reported to invite listeners);
    /// received challenges the server no longer lists expire.
    pub fn refresh_pending(&self) -> ClientResult<Vec<ChallengeRecord>> {
        let pending = self.inner.api.pending_challenges()?;
        let listed: BTreeSet<ChallengeId> = pending.iter().map(|p| p.challenge_id).collect();
        {
            let mut set = self.inner.set.lock();
            let gone: Vec<ChallengeId> = set
                .active
                .values()
                .filter(|r| {
                    r.direction == ChallengeDirection::Incoming && !listed.contains(&r.challenge_id)
                })
                .map(|r| r.challenge_id)
                .collect();
            for id in gone {
                set.retire(id, ChallengeStatus::Expired);
            }
        }
        for entry in pending {
            self.inner.invite(ChallengeInvite {
                challenge_id: entry.challenge_id,
                username: entry.username,
                from_user_id: entry.from_user_id,
            });
        }
        Ok(self.incoming())
    }

    /// Forgets every challenge without contacting the server.
    pub fn reset(&self) {
        *self.inner.set.lock() = ChallengeSet::default();
    }

    /// Drops the invite and start subscriptions.
    pub fn detach(&self) {
        let subscriptions = self.inner.subscriptions.lock().take();
        drop(subscriptions);
    }

    fn leave_queue_best_effort(&self) {
        let queue = self.inner.queue.read().clone();
        if let Some(queue) = queue {
            if let Err(err) = queue.leave_queue() {
                warn!(error = %err, "could not leave queue after accepting challenge");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockApi;
    use crate::channel::MockConnector;
    use gambit_protocol::{
        ApiFailure, Endpoint, JoinQueueResponse, PendingChallenge, RespondChallengeResponse,
        SendChallengeResponse,
    };
    use serde_json::json;

    const ME: ParticipantId = ParticipantId(2);
    const FRIEND: ParticipantId = ParticipantId(1);

    struct Fixture {
        client: ChallengeClient,
        api: Arc<MockApi>,
        connector: MockConnector,
        connection: ConnectionManager,
        invites: Arc<Mutex<Vec<ChallengeRecord>>>,
        starts: Arc<Mutex<Vec<SessionId>>>,
    }

    fn fixture() -> Fixture {
        let connector = MockConnector::new();
        let connection = ConnectionManager::new("ws://test", Arc::new(connector.clone()));
        connection.connect(None).unwrap();
        let api = Arc::new(MockApi::new());
        let client = ChallengeClient::new(ME, api.clone(), &connection);

        let invites = Arc::new(Mutex::new(Vec::new()));
        let sink = invites.clone();
        client.on_invite(move |r| sink.lock().push(r.clone()));
        let starts = Arc::new(Mutex::new(Vec::new()));
        let sink = starts.clone();
        client.on_start(move |s| sink.lock().push(s));

        Fixture {
            client,
            api,
            connector,
            connection,
            invites,
            starts,
        }
    }

    fn invite(fx: &Fixture, id: i64) {
        fx.connector.inject(
            names::CHALLENGE_INVITE,
            json!({"challenge_id": id, "username": "alice", "from_user_id": 1}),
        );
    }

    #[test]
    fn invites_are_deduplicated() {
        let fx = fixture();
        invite(&fx, 7);
        invite(&fx, 7);

        assert_eq!(fx.invites.lock().len(), 1);
        let record = fx.client.get(ChallengeId(7)).unwrap();
        assert_eq!(record.direction, ChallengeDirection::Incoming);
        assert_eq!(record.from, Some(FRIEND));
        assert_eq!(record.username.as_deref(), Some("alice"));
    }

    #[test]
    fn accept_removes_record_and_starts_once() {
        let fx = fixture();
        invite(&fx, 7);
        fx.api.set_respond_challenge_response(Ok(RespondChallengeResponse {
            message: "Challenge accepted".into(),
            game_id: Some(SessionId(3)),
        }));

        let outcome = fx
            .client
            .respond(ChallengeId(7), ChallengeDecision::Accept)
            .unwrap();
        assert_eq!(outcome, RespondOutcome::Accepted(Some(SessionId(3))));
        assert!(fx.client.get(ChallengeId(7)).is_none());
        assert_eq!(fx.client.history()[0].status, ChallengeStatus::Accepted);

        fx.connector
            .inject(names::START_CHALLENGE, json!({"game_id": 3}));
        assert_eq!(fx.starts.lock().as_slice(), &[SessionId(3)]);
    }

    #[test]
    fn missing_challenge_is_confirmation() {
        let fx = fixture();
        invite(&fx, 7);
        fx.api
            .set_respond_challenge_response(Err(ClientError::Rejected(ApiFailure::new(
                404,
                "Challenge not found",
            ))));

        let outcome = fx
            .client
            .respond(ChallengeId(7), ChallengeDecision::Accept)
            .unwrap();
        assert_eq!(outcome, RespondOutcome::AlreadyGone);
        assert!(fx.client.records().is_empty());
    }

    #[test]
    fn refused_answer_still_removes_record() {
        let fx = fixture();
        invite(&fx, 7);
        fx.api
            .set_respond_challenge_response(Err(ClientError::Rejected(ApiFailure::new(
                400,
                "You or challenger is already in an ongoing game",
            ))));

        assert!(fx
            .client
            .respond(ChallengeId(7), ChallengeDecision::Accept)
            .is_err());
        assert!(fx.client.records().is_empty());
    }

    #[test]
    fn transport_failure_keeps_record() {
        let fx = fixture();
        invite(&fx, 7);
        fx.api
            .set_respond_challenge_response(Err(ClientError::transport_retryable("reset")));

        assert!(fx
            .client
            .respond(ChallengeId(7), ChallengeDecision::Decline)
            .is_err());
        assert!(fx.client.get(ChallengeId(7)).is_some());
    }

    #[test]
    fn decline_reports_declined() {
        let fx = fixture();
        invite(&fx, 7);
        fx.api.set_respond_challenge_response(Ok(RespondChallengeResponse {
            message: "Challenge declined".into(),
            game_id: None,
        }));

        let outcome = fx
            .client
            .respond(ChallengeId(7), ChallengeDecision::Decline)
            .unwrap();
        assert_eq!(outcome, RespondOutcome::Declined);
        assert!(fx.starts.lock().is_empty());
    }

    #[test]
    fn send_and_cancel_outgoing() {
        let fx = fixture();
        fx.api.set_send_challenge_response(Ok(SendChallengeResponse {
            message: "Friend challenged successfully".into(),
            challenge_id: ChallengeId(11),
        }));

        let record = fx.client.send_challenge(FRIEND).unwrap();
        assert_eq!(record.direction, ChallengeDirection::Outgoing);
        assert_eq!(fx.api.challenges_sent(), vec![(ME, FRIEND)]);

        assert_eq!(fx.client.cancel_outgoing().unwrap(), 1);
        assert!(fx.client.records().is_empty());
        assert_eq!(fx.client.history()[0].status, ChallengeStatus::Cancelled);
        assert_eq!(fx.client.cancel_outgoing().unwrap(), 0);
    }

    #[test]
    fn start_retires_outgoing_as_accepted() {
        let fx = fixture();
        fx.api.set_send_challenge_response(Ok(SendChallengeResponse {
            message: "Friend challenged successfully".into(),
            challenge_id: ChallengeId(11),
        }));
        fx.client.send_challenge(FRIEND).unwrap();

        fx.connector
            .inject(names::START_CHALLENGE, json!({"game_id": 4}));
        fx.connector
            .inject(names::START_CHALLENGE, json!({"game_id": 4}));

        assert_eq!(fx.starts.lock().as_slice(), &[SessionId(4)]);
        assert_eq!(fx.client.history()[0].status, ChallengeStatus::Accepted);
    }

    #[test]
    fn refresh_pending_merges_and_expires() {
        let fx = fixture();
        invite(&fx, 7);
        fx.api.set_pending_response(Ok(vec![PendingChallenge {
            challenge_id: ChallengeId(8),
            username: "carol".into(),
            from_user_id: Some(ParticipantId(3)),
        }]));

        let incoming = fx.client.refresh_pending().unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].challenge_id, ChallengeId(8));
        assert_eq!(fx.client.history()[0].status, ChallengeStatus::Expired);
        assert_eq!(fx.invites.lock().len(), 2);

        fx.client.refresh_pending().unwrap();
        assert_eq!(fx.invites.lock().len(), 2);
    }

    #[test]
    fn accepting_leaves_queue() {
        let fx = fixture();
        let queue = QueueClient::new(ME, fx.api.clone(), &fx.connection);
        let client = fx.client.clone().with_queue(queue.clone());
        fx.api.set_join_response(Ok(JoinQueueResponse {
            message: "User added to queue".into(),
            game_id: None,
            white_user_id: None,
            black_user_id: None,
        }));
        queue.join_queue().unwrap();
        invite(&fx, 7);
        fx.api.set_respond_challenge_response(Ok(RespondChallengeResponse {
            message: "Challenge accepted".into(),
            game_id: Some(SessionId(3)),
        }));

        client.respond(ChallengeId(7), ChallengeDecision::Accept).unwrap();
        assert!(!queue.is_queued());
        assert_eq!(fx.api.call_count(&Endpoint::LeaveQueue), 1);
    }

    fn send_to(fx: &Fixture, target: ParticipantId, id: i64) {
        fx.api.set_send_challenge_response(Ok(SendChallengeResponse {
            message: "Friend challenged successfully".into(),
            challenge_id: ChallengeId(id),
        }));
        fx.client.send_challenge(target).unwrap();
    }

    #[test]
    fn accepting_incoming_keeps_own_outgoing() {
        let fx = fixture();
        send_to(&fx, ParticipantId(3), 11);
        invite(&fx, 7);
        fx.api.set_respond_challenge_response(Ok(RespondChallengeResponse {
            message: "Challenge accepted".into(),
            game_id: Some(SessionId(3)),
        }));

        fx.client
            .respond(ChallengeId(7), ChallengeDecision::Accept)
            .unwrap();
        fx.connector.inject(
            names::START_CHALLENGE,
            json!({"game_id": 3, "challenge_id": 7}),
        );

        let history: Vec<_> = fx
            .client
            .history()
            .iter()
            .map(|r| (r.challenge_id, r.status))
            .collect();
        assert_eq!(history, vec![(ChallengeId(7), ChallengeStatus::Accepted)]);
        let outgoing = fx.client.outgoing();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].challenge_id, ChallengeId(11));
        assert_eq!(outgoing[0].status, ChallengeStatus::Pending);
        assert_eq!(fx.starts.lock().as_slice(), &[SessionId(3)]);
    }

    #[test]
    fn named_start_retires_only_that_challenge() {
        let fx = fixture();
        send_to(&fx, ParticipantId(3), 11);
        send_to(&fx, ParticipantId(4), 12);

        fx.connector.inject(
            names::START_CHALLENGE,
            json!({"game_id": 5, "challenge_id": 12}),
        );
        assert_eq!(fx.client.history()[0].challenge_id, ChallengeId(12));
        assert_eq!(fx.client.outgoing()[0].challenge_id, ChallengeId(11));

        // An unnamed start cannot be attributed while two were open.
        send_to(&fx, ParticipantId(4), 13);
        fx.connector
            .inject(names::START_CHALLENGE, json!({"game_id": 6}));
        assert_eq!(fx.client.outgoing().len(), 2);
        assert_eq!(fx.starts.lock().as_slice(), &[SessionId(5), SessionId(6)]);
    }

    #[test]
    fn history_and_started_are_bounded() {
        let fx = fixture();
        fx.api.set_respond_challenge_response(Ok(RespondChallengeResponse {
            message: "Challenge declined".into(),
            game_id: None,
        }));
        let total = CHALLENGE_HISTORY_LIMIT as i64 + 6;
        for id in 1..=total {
            invite(&fx, id);
            fx.client
                .respond(ChallengeId(id), ChallengeDecision::Decline)
                .unwrap();
        }
        let history = fx.client.history();
        assert_eq!(history.len(), CHALLENGE_HISTORY_LIMIT);
        assert_eq!(history[0].challenge_id, ChallengeId(7));
        assert_eq!(history[CHALLENGE_HISTORY_LIMIT - 1].challenge_id, ChallengeId(total));

        for id in 1..=(STARTED_LIMIT as i64 * 2) {
            fx.connector
                .inject(names::START_CHALLENGE, json!({"game_id": id}));
        }
        assert_eq!(fx.client.inner.set.lock().started.len(), STARTED_LIMIT);
        // The newest starts are still deduplicated.
        fx.connector.inject(
            names::START_CHALLENGE,
            json!({"game_id": STARTED_LIMIT as i64 * 2}),
        );
        assert_eq!(fx.starts.lock().len(), STARTED_LIMIT * 2);
    }
}
