//! Game session state machine.
//!
//! ```text
//! joining ──snapshot──▶ active ◀──decline──▶ draw-pending
//!                         │                       │
//!                         └──────game over────────┴──▶ terminated
//! ```
//!
//! A [`GameSessionMachine`] subscribes to its session's pushes on creation,
//! fetches the authoritative snapshot and only then accepts local moves.
//! Outbound requests never mutate local state on their own, except where the
//! server's answer is itself the decision (move acknowledgment, a successful
//! decline). Termination tears down the reconciler and the subscriptions and
//! reports the outcome once. A session the server no longer recognizes, or
//! one whose credential can no longer be refreshed, is abandoned: it
//! terminates without an outcome.

use crate::api::GameApi;
use crate::connection::{ConnectionManager, Subscriptions};
use crate::error::{ClientError, ClientResult};
use crate::reconcile::{LocalMove, MoveReconciler, Refusal, RemoteMove};
use gambit_protocol::{
    decode_payload, encode_payload, names, BoardOutcome, DrawDeclined, DrawOffered, GameOver,
    GameOverReason, GameRoom, GameSnapshot, LegalDestination, MoveAttempt, MoveMade,
    MoveNotation, ParticipantId, Position, PromotionPiece, RulesEngine, SessionId, Side, Square,
};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

/// Status of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Waiting for the first authoritative snapshot.
    Joining,
    /// Moves are accepted.
    Active,
    /// The opponent offered a draw.
    DrawPending,
    /// The game is over, or the session was abandoned.
    Terminated,
}

impl SessionStatus {
    /// Wire-style name.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Joining => "joining",
            SessionStatus::Active => "active",
            SessionStatus::DrawPending => "draw-pending",
            SessionStatus::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Winner, absent for a draw.
    pub winner_id: Option<ParticipantId>,
    /// Reason tag.
    pub reason: GameOverReason,
}

impl SessionOutcome {
    /// Whether nobody won.
    pub fn is_draw(&self) -> bool {
        self.winner_id.is_none()
    }

    /// Whether `participant` won.
    pub fn is_win_for(&self, participant: ParticipantId) -> bool {
        self.winner_id == Some(participant)
    }
}

impl From<GameOver> for SessionOutcome {
    fn from(over: GameOver) -> Self {
        Self {
            winner_id: over.winner_id,
            reason: over.reason,
        }
    }
}

/// Result of [`GameSessionMachine::submit_move`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveSubmission {
    /// Refused locally; the server was not contacted.
    Refused(Refusal),
    /// The server accepted the move.
    Confirmed(Position),
    /// The server rejected the move and the position was resynced.
    RolledBack {
        /// The server's answer.
        failure: ClientError,
        /// Authoritative position after the resync.
        position: Position,
    },
    /// The session was left or ended while the request was in flight.
    Ignored,
}

/// Callback invoked once with the outcome of a session.
pub type OutcomeListener = Arc<dyn Fn(SessionId, &SessionOutcome) + Send + Sync>;

/// Read-only copy of a session's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Session id.
    pub session_id: SessionId,
    /// Local participant.
    pub local_participant: ParticipantId,
    /// Participant playing white.
    pub white: Option<ParticipantId>,
    /// Participant playing black.
    pub black: Option<ParticipantId>,
    /// Side the local participant plays.
    pub local_side: Option<Side>,
    /// Current status.
    pub status: SessionStatus,
    /// Position to display.
    pub position: Option<Position>,
    /// Local move awaiting the server.
    pub pending_move: Option<MoveNotation>,
    /// Opponent with an open draw offer.
    pub draw_offered_by: Option<ParticipantId>,
    /// Whether the local participant's own draw offer is outstanding.
    pub own_draw_offer: bool,
    /// White clock in seconds.
    pub white_time_left: Option<i64>,
    /// Black clock in seconds.
    pub black_time_left: Option<i64>,
    /// Outcome once terminated.
    pub outcome: Option<SessionOutcome>,
}

impl SessionView {
    /// The opponent of the local participant.
    pub fn opponent(&self) -> Option<ParticipantId> {
        match self.local_side? {
            Side::White => self.black,
            Side::Black => self.white,
        }
    }
}

struct SessionState {
    status: SessionStatus,
    white: Option<ParticipantId>,
    black: Option<ParticipantId>,
    local_side: Option<Side>,
    reconciler: Option<MoveReconciler>,
    final_position: Option<Position>,
    draw_offered_by: Option<ParticipantId>,
    own_draw_offer: bool,
    white_time_left: Option<i64>,
    black_time_left: Option<i64>,
    held_game_over: Option<GameOver>,
    outcome: Option<SessionOutcome>,
}

/// Work left to do once the state lock is released.
#[derive(Default)]
#[must_use]
struct Teardown {
    subscriptions: Option<Subscriptions>,
    outcome: Option<SessionOutcome>,
}

struct SessionInner {
    session_id: SessionId,
    local: ParticipantId,
    api: Arc<dyn GameApi>,
    rules: Arc<dyn RulesEngine>,
    state: Mutex<SessionState>,
    subscriptions: Mutex<Option<Subscriptions>>,
    alive: AtomicBool,
    listeners: RwLock<Vec<OutcomeListener>>,
}

impl SessionInner {
    fn for_this_session(&self, game_id: Option<SessionId>) -> bool {
        game_id.map_or(true, |id| id == self.session_id)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn finish(&self, teardown: Teardown) {
        // Dropping the guard undoes the session's registrations.
        drop(teardown.subscriptions);
        let Some(outcome) = teardown.outcome else {
            return;
        };
        let listeners: Vec<OutcomeListener> = self.listeners.read().clone();
        for listener in listeners {
            listener(self.session_id, &outcome);
        }
    }

    fn terminate_locked(
        &self,
        state: &mut SessionState,
        outcome: Option<SessionOutcome>,
    ) -> Teardown {
        if state.status == SessionStatus::Terminated {
            return Teardown::default();
        }
        self.alive.store(false, Ordering::SeqCst);
        info!(
            session_id = %self.session_id,
            winner_id = ?outcome.as_ref().and_then(|o| o.winner_id),
            reason = ?outcome.as_ref().map(|o| o.reason.tag().to_string()),
            "session terminated"
        );
        state.status = SessionStatus::Terminated;
        if let Some(reconciler) = state.reconciler.take() {
            state.final_position = Some(reconciler.authoritative_position().clone());
        }
        state.draw_offered_by = None;
        state.own_draw_offer = false;
        state.held_game_over = None;
        state.outcome = outcome.clone();
        Teardown {
            subscriptions: self.subscriptions.lock().take(),
            outcome,
        }
    }

    fn apply_draw_offer(&self, state: &mut SessionState, from: Option<ParticipantId>) {
        match from {
            Some(offerer) if offerer == self.local => {
                state.own_draw_offer = true;
                state.draw_offered_by = None;
                state.status = SessionStatus::Active;
            }
            Some(offerer) => {
                state.own_draw_offer = false;
                state.draw_offered_by = Some(offerer);
                state.status = SessionStatus::DrawPending;
            }
            None => {
                state.own_draw_offer = false;
                state.draw_offered_by = None;
                state.status = SessionStatus::Active;
            }
        }
    }

    fn snapshot_outcome(&self, snapshot: &GameSnapshot) -> SessionOutcome {
        let reason = match self.rules.outcome(&snapshot.current_fen) {
            Ok(Some(BoardOutcome::Checkmate { .. })) => GameOverReason::Checkmate,
            Ok(Some(BoardOutcome::Stalemate)) => GameOverReason::Stalemate,
            Ok(Some(BoardOutcome::InsufficientMaterial)) => GameOverReason::InsufficientMaterial,
            _ if snapshot.winner_id.is_none() => GameOverReason::Draw,
            _ => GameOverReason::Other("Game over".to_string()),
        };
        SessionOutcome {
            winner_id: snapshot.winner_id,
            reason,
        }
    }

    fn apply_snapshot_locked(&self, state: &mut SessionState, snapshot: &GameSnapshot) -> Teardown {
        if state.status == SessionStatus::Terminated {
            return Teardown::default();
        }
        let side = snapshot.side_of(self.local);
        state.white = Some(snapshot.white_user_id);
        state.black = Some(snapshot.black_user_id);
        state.local_side = side;
        state.white_time_left = snapshot.white_time_left;
        state.black_time_left = snapshot.black_time_left;

        match state.reconciler.as_mut() {
            Some(reconciler) => reconciler.rollback_to(snapshot.current_fen.clone()),
            None => {
                state.reconciler = Some(MoveReconciler::new(
                    self.rules.clone(),
                    side,
                    snapshot.current_fen.clone(),
                ))
            }
        }
        self.apply_draw_offer(state, snapshot.draw_offer_from);

        if !snapshot.in_progress {
            let outcome = match state.held_game_over.take() {
                Some(over) => over.into(),
                None => self.snapshot_outcome(snapshot),
            };
            return self.terminate_locked(state, Some(outcome));
        }
        if let Some(over) = state.held_game_over.take() {
            return self.terminate_locked(state, Some(over.into()));
        }
        Teardown::default()
    }

    fn apply_acknowledgment_locked(
        &self,
        state: &mut SessionState,
        snapshot: &GameSnapshot,
    ) -> Teardown {
        if let Some(reconciler) = state.reconciler.as_mut() {
            reconciler.acknowledge(&snapshot.current_fen);
        }
        state.white_time_left = snapshot.white_time_left;
        state.black_time_left = snapshot.black_time_left;
        self.apply_draw_offer(state, snapshot.draw_offer_from);
        if !snapshot.in_progress {
            let outcome = self.snapshot_outcome(snapshot);
            return self.terminate_locked(state, Some(outcome));
        }
        Teardown::default()
    }

    fn on_move_made(&self, made: MoveMade) {
        if !self.for_this_session(made.game_id) {
            return;
        }
        let mut state = self.state.lock();
        if state.status == SessionStatus::Joining {
            trace!(session_id = %self.session_id, "ignoring move while joining");
            return;
        }
        let Some(reconciler) = state.reconciler.as_mut() else {
            return;
        };
        let outcome = reconciler.confirm_remote(&made.notation, &made.current_fen);
        debug!(session_id = %self.session_id, notation = %made.notation, ?outcome, "move pushed");
        if !matches!(outcome, RemoteMove::Duplicate | RemoteMove::Stale) {
            // The server drops any open draw offer when a move is made.
            self.apply_draw_offer(&mut state, None);
            if made.white_time_left.is_some() {
                state.white_time_left = made.white_time_left;
            }
            if made.black_time_left.is_some() {
                state.black_time_left = made.black_time_left;
            }
        }
    }

    fn on_game_over(&self, over: GameOver) {
        if !self.for_this_session(over.game_id) {
            return;
        }
        let teardown = {
            let mut state = self.state.lock();
            match state.status {
                SessionStatus::Terminated => return,
                SessionStatus::Joining => {
                    debug!(session_id = %self.session_id, "holding game over until joined");
                    state.held_game_over = Some(over);
                    return;
                }
                SessionStatus::Active | SessionStatus::DrawPending => {
                    self.terminate_locked(&mut state, Some(over.into()))
                }
            }
        };
        self.finish(teardown);
    }

    fn on_draw_offered(&self, offered: DrawOffered) {
        if !self.for_this_session(offered.game_id) {
            return;
        }
        let mut state = self.state.lock();
        if matches!(
            state.status,
            SessionStatus::Joining | SessionStatus::Terminated
        ) {
            return;
        }
        debug!(session_id = %self.session_id, offerer_id = %offered.offerer_id, "draw offered");
        self.apply_draw_offer(&mut state, Some(offered.offerer_id));
    }

    fn on_draw_declined(&self, declined: DrawDeclined) {
        if !self.for_this_session(declined.game_id) {
            return;
        }
        let mut state = self.state.lock();
        if matches!(
            state.status,
            SessionStatus::Joining | SessionStatus::Terminated
        ) {
            return;
        }
        self.apply_draw_offer(&mut state, None);
    }
}

fn listen<T, F>(subs: &mut Subscriptions, event: &str, weak: &Weak<SessionInner>, apply: F)
where
    T: DeserializeOwned,
    F: Fn(&SessionInner, T) + Send + Sync + 'static,
{
    let weak = weak.clone();
    let name = event.to_string();
    subs.on(event, move |payload: &Value| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        match decode_payload::<T>(payload) {
            Ok(event) => apply(inner.as_ref(), event),
            Err(err) => warn!(event = %name, error = %err, "dropping malformed push"),
        }
    });
}

/// One game session seen by the local participant.
///
/// Cloning is cheap; all clones drive the same session. Dropping the last
/// clone leaves the session.
#[derive(Clone)]
pub struct GameSessionMachine {
    inner: Arc<SessionInner>,
}

impl GameSessionMachine {
    /// Subscribes to `session_id` and fetches its snapshot.
    ///
    /// A snapshot that cannot be found (or may not be read) terminates the
    /// session and returns [`ClientError::StaleSession`].
    pub fn enter(
        session_id: SessionId,
        local: ParticipantId,
        api: Arc<dyn GameApi>,
        rules: Arc<dyn RulesEngine>,
        connection: &ConnectionManager,
    ) -> ClientResult<Self> {
        let machine = Self::subscribe(session_id, local, api, rules, connection)?;
        machine.refresh()?;
        Ok(machine)
    }

    /// Subscribes to `session_id` without fetching; the session stays joining.
    pub fn subscribe(
        session_id: SessionId,
        local: ParticipantId,
        api: Arc<dyn GameApi>,
        rules: Arc<dyn RulesEngine>,
        connection: &ConnectionManager,
    ) -> ClientResult<Self> {
        let inner = Arc::new(SessionInner {
            session_id,
            local,
            api,
            rules,
            state: Mutex::new(SessionState {
                status: SessionStatus::Joining,
                white: None,
                black: None,
                local_side: None,
                reconciler: None,
                final_position: None,
                draw_offered_by: None,
                own_draw_offer: false,
                white_time_left: None,
                black_time_left: None,
                held_game_over: None,
                outcome: None,
            }),
            subscriptions: Mutex::new(None),
            alive: AtomicBool::new(true),
            listeners: RwLock::new(Vec::new()),
        });

        let weak = Arc::downgrade(&inner);
        let mut subs = connection.subscriptions();
        listen(&mut subs, names::MOVE_MADE, &weak, SessionInner::on_move_made);
        listen(&mut subs, names::GAME_OVER, &weak, SessionInner::on_game_over);
        listen(&mut subs, names::DRAW_OFFERED, &weak, SessionInner::on_draw_offered);
        listen(&mut subs, names::DRAW_DECLINED, &weak, SessionInner::on_draw_declined);

        let room = encode_payload(&GameRoom {
            game_id: session_id,
        })?;
        subs.retain(
            names::JOIN_GAME,
            room.clone(),
            Some((names::LEAVE_GAME.to_string(), room)),
        );
        *inner.subscriptions.lock() = Some(subs);

        debug!(%session_id, participant_id = %local, "session subscribed");
        Ok(Self { inner })
    }

    /// Session id.
    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    /// Local participant.
    pub fn local_participant(&self) -> ParticipantId {
        self.inner.local
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.inner.state.lock().status
    }

    /// Whether the session was neither left nor terminated.
    pub fn is_live(&self) -> bool {
        self.inner.is_alive()
    }

    /// Position to display, optimistic while a local move is in flight.
    pub fn current_position(&self) -> Option<Position> {
        let state = self.inner.state.lock();
        match state.reconciler.as_ref() {
            Some(reconciler) => Some(reconciler.current_position().clone()),
            None => state.final_position.clone(),
        }
    }

    /// The opponent's open draw offer.
    pub fn draw_offered_by(&self) -> Option<ParticipantId> {
        self.inner.state.lock().draw_offered_by
    }

    /// Outcome of a terminated session.
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.inner.state.lock().outcome.clone()
    }

    /// Copies the session state.
    pub fn view(&self) -> SessionView {
        let state = self.inner.state.lock();
        let (position, pending_move) = match state.reconciler.as_ref() {
            Some(r) => (
                Some(r.current_position().clone()),
                r.pending_notation().cloned(),
            ),
            None => (state.final_position.clone(), None),
        };
        SessionView {
            session_id: self.inner.session_id,
            local_participant: self.inner.local,
            white: state.white,
            black: state.black,
            local_side: state.local_side,
            status: state.status,
            position,
            pending_move,
            draw_offered_by: state.draw_offered_by,
            own_draw_offer: state.own_draw_offer,
            white_time_left: state.white_time_left,
            black_time_left: state.black_time_left,
            outcome: state.outcome.clone(),
        }
    }

    /// Registers a callback for the outcome.
    pub fn on_outcome<F>(&self, listener: F)
    where
        F: Fn(SessionId, &SessionOutcome) + Send + Sync + 'static,
    {
        self.inner.listeners.write().push(Arc::new(listener));
    }

    /// Destinations reachable from `from` in the displayed position.
    pub fn legal_destinations(&self, from: Square) -> ClientResult<Vec<LegalDestination>> {
        let state = self.inner.state.lock();
        match state.reconciler.as_ref() {
            Some(reconciler) => reconciler.legal_destinations(from),
            None => Ok(Vec::new()),
        }
    }

    /// Re-fetches the authoritative snapshot.
    ///
    /// The first successful fetch moves the session from joining to active.
    pub fn refresh(&self) -> ClientResult<SessionStatus> {
        self.ensure_live()?;
        let snapshot = self.stale_on_missing(self.inner.api.fetch_session(self.inner.session_id))?;
        let (teardown, status) = {
            let mut state = self.inner.state.lock();
            if !self.inner.is_alive() {
                return Err(ClientError::SessionClosed);
            }
            let teardown = self.inner.apply_snapshot_locked(&mut state, &snapshot);
            (teardown, state.status)
        };
        self.inner.finish(teardown);
        debug!(session_id = %self.inner.session_id, %status, "snapshot applied");
        Ok(status)
    }

    /// Moves a piece, optimistically, and submits the move.
    pub fn submit_move(
        &self,
        from: Square,
        to: Square,
        promotion: Option<PromotionPiece>,
    ) -> ClientResult<MoveSubmission> {
        let attempt = MoveAttempt::new(self.inner.session_id, from, to, promotion);
        let notation = {
            let mut state = self.inner.state.lock();
            if !matches!(
                state.status,
                SessionStatus::Active | SessionStatus::DrawPending
            ) {
                return Ok(MoveSubmission::Refused(Refusal::NotActive));
            }
            let Some(reconciler) = state.reconciler.as_mut() else {
                return Ok(MoveSubmission::Refused(Refusal::NotActive));
            };
            match reconciler.apply_local(attempt)? {
                LocalMove::Refused(refusal) => return Ok(MoveSubmission::Refused(refusal)),
                LocalMove::Accepted { notation, .. } => notation,
            }
        };

        match self.inner.api.submit_move(self.inner.session_id, &notation) {
            Ok(snapshot) => {
                let (teardown, position) = {
                    let mut state = self.inner.state.lock();
                    if !self.inner.is_alive() {
                        return Ok(MoveSubmission::Ignored);
                    }
                    let teardown = self.inner.apply_acknowledgment_locked(&mut state, &snapshot);
                    (teardown, snapshot.current_fen.clone())
                };
                self.inner.finish(teardown);
                Ok(MoveSubmission::Confirmed(position))
            }
            Err(failure) if Self::is_missing(&failure) => {
                self.abandon("stale session");
                Err(ClientError::StaleSession(self.inner.session_id))
            }
            Err(ClientError::CredentialExpired) => {
                self.abandon("credential expired");
                Err(ClientError::CredentialExpired)
            }
            Err(failure @ ClientError::Rejected(_)) => {
                info!(session_id = %self.inner.session_id, notation = %notation, error = %failure, "move rejected, resyncing");
                self.resync_after(failure)
            }
            Err(err) => {
                let mut state = self.inner.state.lock();
                if let Some(reconciler) = state.reconciler.as_mut() {
                    reconciler.abandon_pending();
                }
                warn!(session_id = %self.inner.session_id, error = %err, "move submission failed");
                Err(err)
            }
        }
    }

    /// Resigns. The session ends when the server confirms.
    pub fn resign(&self) -> ClientResult<()> {
        self.ensure_started()?;
        self.stale_on_missing(self.inner.api.resign(self.inner.session_id))
    }

    /// Offers a draw.
    pub fn offer_draw(&self) -> ClientResult<()> {
        self.ensure_started()?;
        self.stale_on_missing(self.inner.api.offer_draw(self.inner.session_id))
    }

    /// Claims a win because the opponent's clock ran out.
    pub fn claim_timeout(&self) -> ClientResult<()> {
        self.ensure_started()?;
        self.stale_on_missing(self.inner.api.claim_timeout(self.inner.session_id))
    }

    /// Answers the opponent's draw offer.
    ///
    /// A successful decline returns the session to active. An accept ends
    /// the session when the server's game over arrives.
    pub fn respond_draw(&self, accepted: bool) -> ClientResult<()> {
        let status = self.status();
        if status != SessionStatus::DrawPending {
            return Err(ClientError::InvalidStateTransition {
                from: status.to_string(),
                to: if accepted { "terminated" } else { "active" }.to_string(),
            });
        }
        self.stale_on_missing(self.inner.api.respond_draw(self.inner.session_id, accepted))?;
        if !accepted {
            let mut state = self.inner.state.lock();
            if self.inner.is_alive() && state.status == SessionStatus::DrawPending {
                self.inner.apply_draw_offer(&mut state, None);
            }
        }
        Ok(())
    }

    /// Stops following the session without resigning.
    pub fn leave(&self) {
        if !self.inner.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let subscriptions = {
            let mut state = self.inner.state.lock();
            if let Some(reconciler) = state.reconciler.take() {
                state.final_position = Some(reconciler.authoritative_position().clone());
            }
            self.inner.subscriptions.lock().take()
        };
        drop(subscriptions);
        info!(session_id = %self.inner.session_id, "session left");
    }

    fn ensure_live(&self) -> ClientResult<()> {
        if self.inner.is_alive() {
            Ok(())
        } else {
            Err(ClientError::SessionClosed)
        }
    }

    fn ensure_started(&self) -> ClientResult<()> {
        self.ensure_live()?;
        match self.status() {
            SessionStatus::Active | SessionStatus::DrawPending => Ok(()),
            status => Err(ClientError::InvalidStateTransition {
                from: status.to_string(),
                to: "request".to_string(),
            }),
        }
    }

    fn is_missing(err: &ClientError) -> bool {
        err.failure()
            .is_some_and(|f| f.is_not_found() || f.is_unauthorized())
    }

    fn stale_on_missing<T>(&self, result: ClientResult<T>) -> ClientResult<T> {
        match result {
            Err(err) if Self::is_missing(&err) => {
                self.abandon("stale session");
                Err(ClientError::StaleSession(self.inner.session_id))
            }
            Err(ClientError::CredentialExpired) => {
                self.abandon("credential expired");
                Err(ClientError::CredentialExpired)
            }
            other => other,
        }
    }

    fn abandon(&self, cause: &'static str) {
        warn!(session_id = %self.inner.session_id, cause, "abandoning session");
        let teardown = {
            let mut state = self.inner.state.lock();
            self.inner.terminate_locked(&mut state, None)
        };
        self.inner.finish(teardown);
    }

    fn resync_after(&self, failure: ClientError) -> ClientResult<MoveSubmission> {
        let fetched = self.inner.api.fetch_session(self.inner.session_id);
        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(err) => {
                {
                    let mut state = self.inner.state.lock();
                    if let Some(reconciler) = state.reconciler.as_mut() {
                        reconciler.abandon_pending();
                    }
                }
                return self.stale_on_missing(Err(err));
            }
        };
        let teardown = {
            let mut state = self.inner.state.lock();
            if !self.inner.is_alive() {
                return Ok(MoveSubmission::Ignored);
            }
            self.inner.apply_snapshot_locked(&mut state, &snapshot)
        };
        self.inner.finish(teardown);
        Ok(MoveSubmission::RolledBack {
            failure,
            position: snapshot.current_fen,
        })
    }
}

impl fmt::Debug for GameSessionMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameSessionMachine")
            .field("session_id", &self.inner.session_id)
            .field("local", &self.inner.local)
            .field("status", &self.status())
            .finish()
    }
}
