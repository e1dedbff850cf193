//! Matchmaking queue client.

use crate::api::GameApi;
use crate::connection::{ConnectionManager, Subscriptions};
use crate::error::{ClientError, ClientResult};
use gambit_protocol::{decode_payload, names, ParticipantId, QueuePairing, SessionId, Side};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Queue membership of the local participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// Not waiting for a game.
    NotQueued,
    /// Waiting for a pairing notification.
    Queued,
    /// Paired into a session; membership ended.
    Paired(SessionId),
}

/// A pairing produced by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    /// New session.
    pub session_id: SessionId,
    /// Opponent, when the server reports it.
    pub opponent: Option<ParticipantId>,
    /// Side the local participant plays, when the server reports it.
    pub color: Option<Side>,
}

/// Result of [`QueueClient::join_queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Whether the join paired immediately.
    pub paired: bool,
    /// Session of an immediate pairing.
    pub session_id: Option<SessionId>,
}

/// Callback for pairings.
pub type PairingListener = Arc<dyn Fn(&Pairing) + Send + Sync>;

struct QueueInner {
    local: ParticipantId,
    api: Arc<dyn GameApi>,
    status: Mutex<QueueStatus>,
    listeners: RwLock<Vec<PairingListener>>,
    subscriptions: Mutex<Option<Subscriptions>>,
}

impl QueueInner {
    /// Moves from queued to paired. Any other status ignores the pairing.
    fn pair(&self, pairing: Pairing) -> bool {
        {
            let mut status = self.status.lock();
            if *status != QueueStatus::Queued {
                trace!(session_id = %pairing.session_id, status = ?*status, "ignoring pairing");
                return false;
            }
            *status = QueueStatus::Paired(pairing.session_id);
        }
        info!(session_id = %pairing.session_id, opponent = ?pairing.opponent, "paired");
        let listeners: Vec<PairingListener> = self.listeners.read().clone();
        for listener in listeners {
            listener(&pairing);
        }
        true
    }

    fn pairing_from_ids(
        &self,
        session_id: SessionId,
        white: Option<ParticipantId>,
        black: Option<ParticipantId>,
    ) -> Pairing {
        let (opponent, color) = if white == Some(self.local) {
            (black, Some(Side::White))
        } else if black == Some(self.local) {
            (white, Some(Side::Black))
        } else {
            (None, None)
        };
        Pairing {
            session_id,
            opponent,
            color,
        }
    }
}

/// Joins and leaves the pairing queue and reports pairings.
///
/// A pairing can arrive three ways: in the join response, as a `start_game`
/// push, or through [`poll_status`](Self::poll_status). Only the first one
/// observed while queued takes effect.
#[derive(Clone)]
pub struct QueueClient {
    inner: Arc<QueueInner>,
}

impl QueueClient {
    /// Creates a queue client for `local` and subscribes to pairing pushes.
    pub fn new(local: ParticipantId, api: Arc<dyn GameApi>, connection: &ConnectionManager) -> Self {
        let inner = Arc::new(QueueInner {
            local,
            api,
            status: Mutex::new(QueueStatus::NotQueued),
            listeners: RwLock::new(Vec::new()),
            subscriptions: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let mut subs = connection.subscriptions();
        subs.on(names::START_GAME, move |payload| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match decode_payload::<QueuePairing>(payload) {
                Ok(pairing) => {
                    inner.pair(Pairing {
                        session_id: pairing.game_id,
                        opponent: pairing.opponent,
                        color: pairing.color,
                    });
                }
                Err(err) => warn!(error = %err, "dropping malformed pairing"),
            }
        });
        *inner.subscriptions.lock() = Some(subs);

        Self { inner }
    }

    /// Current membership.
    pub fn status(&self) -> QueueStatus {
        *self.inner.status.lock()
    }

    /// Whether the local participant is waiting in the queue.
    pub fn is_queued(&self) -> bool {
        self.status() == QueueStatus::Queued
    }

    /// Registers a pairing callback.
    pub fn on_pairing<F>(&self, listener: F)
    where
        F: Fn(&Pairing) + Send + Sync + 'static,
    {
        self.inner.listeners.write().push(Arc::new(listener));
    }

    /// Joins the queue.
    ///
    /// An immediate pairing skips the queued status. Joining while already
    /// queued does nothing.
    pub fn join_queue(&self) -> ClientResult<JoinOutcome> {
        if self.is_queued() {
            return Ok(JoinOutcome {
                paired: false,
                session_id: None,
            });
        }

        let response = match self.inner.api.join_queue() {
            Ok(response) => response,
            Err(ClientError::Rejected(failure))
                if failure.is_bad_request() && failure.message == "User already in queue" =>
            {
                debug!("server already has us queued");
                *self.inner.status.lock() = QueueStatus::Queued;
                return Ok(JoinOutcome {
                    paired: false,
                    session_id: None,
                });
            }
            Err(err) => return Err(err),
        };

        *self.inner.status.lock() = QueueStatus::Queued;
        match response.game_id {
            Some(session_id) => {
                let pairing = self.inner.pairing_from_ids(
                    session_id,
                    response.white_user_id,
                    response.black_user_id,
                );
                self.inner.pair(pairing);
                Ok(JoinOutcome {
                    paired: true,
                    session_id: Some(session_id),
                })
            }
            None => {
                info!(participant_id = %self.inner.local, "queued");
                Ok(JoinOutcome {
                    paired: false,
                    session_id: None,
                })
            }
        }
    }

    /// Leaves the queue. Not being queued is a successful no-op.
    pub fn leave_queue(&self) -> ClientResult<()> {
        if !self.is_queued() {
            return Ok(());
        }
        match self.inner.api.leave_queue() {
            Ok(()) => {}
            Err(ClientError::Rejected(failure)) if failure.is_bad_request() => {
                debug!(message = %failure.message, "server had no queue entry");
            }
            Err(err) => return Err(err),
        }
        let mut status = self.inner.status.lock();
        if *status == QueueStatus::Queued {
            *status = QueueStatus::NotQueued;
        }
        info!(participant_id = %self.inner.local, "left queue");
        Ok(())
    }

    /// Asks the server whether a pairing happened.
    pub fn poll_status(&self) -> ClientResult<QueueStatus> {
        if !self.is_queued() {
            return Ok(self.status());
        }
        let response = self.inner.api.queue_status()?;
        if let (true, Some(session_id)) = (response.paired, response.game_id) {
            let pairing = self.inner.pairing_from_ids(
                session_id,
                response.white_user_id,
                response.black_user_id,
            );
            self.inner.pair(pairing);
        }
        Ok(self.status())
    }

    /// Forgets the membership without contacting the server.
    pub fn reset(&self) {
        *self.inner.status.lock() = QueueStatus::NotQueued;
    }

    /// Drops the pairing subscription.
    pub fn detach(&self) {
        let subscriptions = self.inner.subscriptions.lock().take();
        drop(subscriptions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockApi;
    use crate::channel::MockConnector;
    use gambit_protocol::{ApiFailure, Endpoint, JoinQueueResponse, QueueStatusResponse};
    use proptest::prelude::*;
    use serde_json::json;

    const ME: ParticipantId = ParticipantId(1);

    fn fixture() -> (QueueClient, Arc<MockApi>, MockConnector, Arc<Mutex<Vec<Pairing>>>) {
        let connector = MockConnector::new();
        let connection = ConnectionManager::new("ws://test", Arc::new(connector.clone()));
        connection.connect(None).unwrap();
        let api = Arc::new(MockApi::new());
        let queue = QueueClient::new(ME, api.clone(), &connection);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        queue.on_pairing(move |p| sink.lock().push(*p));
        (queue, api, connector, seen)
    }

    fn waiting() -> JoinQueueResponse {
        JoinQueueResponse {
            message: "User added to queue".into(),
            game_id: None,
            white_user_id: None,
            black_user_id: None,
        }
    }

    #[test]
    fn join_then_pairing_push() {
        let (queue, api, connector, seen) = fixture();
        api.set_join_response(Ok(waiting()));

        let outcome = queue.join_queue().unwrap();
        assert!(!outcome.paired);
        assert_eq!(queue.status(), QueueStatus::Queued);

        connector.inject(
            names::START_GAME,
            json!({"game_id": 4, "opponent": 2, "color": "white"}),
        );
        assert_eq!(queue.status(), QueueStatus::Paired(SessionId(4)));
        assert_eq!(
            seen.lock().as_slice(),
            &[Pairing {
                session_id: SessionId(4),
                opponent: Some(ParticipantId(2)),
                color: Some(Side::White),
            }]
        );
    }

    #[test]
    fn immediate_pairing_skips_queued() {
        let (queue, api, connector, seen) = fixture();
        api.set_join_response(Ok(JoinQueueResponse {
            message: "Paired".into(),
            game_id: Some(SessionId(9)),
            white_user_id: Some(ParticipantId(2)),
            black_user_id: Some(ME),
        }));

        let outcome = queue.join_queue().unwrap();
        assert_eq!(
            outcome,
            JoinOutcome {
                paired: true,
                session_id: Some(SessionId(9)),
            }
        );
        assert_eq!(seen.lock()[0].color, Some(Side::Black));

        // The push for the same pairing arrives after the response.
        connector.inject(names::START_GAME, json!({"game_id": 9}));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn pairing_ignored_unless_queued() {
        let (queue, _api, connector, seen) = fixture();
        connector.inject(names::START_GAME, json!({"game_id": 4}));

        assert_eq!(queue.status(), QueueStatus::NotQueued);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn join_while_queued_is_noop() {
        let (queue, api, _connector, _seen) = fixture();
        api.set_join_response(Ok(waiting()));
        queue.join_queue().unwrap();
        queue.join_queue().unwrap();

        assert_eq!(api.call_count(&Endpoint::JoinQueue), 1);
    }

    #[test]
    fn leave_accepts_not_in_queue_answer() {
        let (queue, api, _connector, _seen) = fixture();
        api.set_join_response(Ok(waiting()));
        api.set_leave_response(Err(ClientError::Rejected(ApiFailure::new(
            400,
            "User not in queue",
        ))));
        queue.join_queue().unwrap();

        queue.leave_queue().unwrap();
        assert_eq!(queue.status(), QueueStatus::NotQueued);
    }

    #[test]
    fn leave_keeps_membership_on_transport_failure() {
        let (queue, api, _connector, _seen) = fixture();
        api.set_join_response(Ok(waiting()));
        api.set_leave_response(Err(ClientError::transport_retryable("reset")));
        queue.join_queue().unwrap();

        assert!(queue.leave_queue().is_err());
        assert!(queue.is_queued());
    }

    #[test]
    fn poll_and_push_do_not_double_pair() {
        let (queue, api, connector, seen) = fixture();
        api.set_join_response(Ok(waiting()));
        api.set_status_response(Ok(QueueStatusResponse {
            paired: true,
            game_id: Some(SessionId(5)),
            white_user_id: Some(ME),
            black_user_id: Some(ParticipantId(3)),
        }));
        queue.join_queue().unwrap();

        assert_eq!(queue.poll_status().unwrap(), QueueStatus::Paired(SessionId(5)));
        connector.inject(names::START_GAME, json!({"game_id": 5}));
        assert_eq!(queue.poll_status().unwrap(), QueueStatus::Paired(SessionId(5)));

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0].opponent, Some(ParticipantId(3)));
        assert_eq!(api.call_count(&Endpoint::QueueStatus), 1);
    }

    proptest! {
        #[test]
        fn leave_when_not_queued_changes_nothing(leaves in 1usize..8, paired in any::<bool>()) {
            let (queue, api, _connector, _seen) = fixture();
            if paired {
                api.set_join_response(Ok(JoinQueueResponse {
                    message: "Paired".into(),
                    game_id: Some(SessionId(2)),
                    white_user_id: Some(ME),
                    black_user_id: Some(ParticipantId(2)),
                }));
                queue.join_queue().unwrap();
            }
            let before = queue.status();
            for _ in 0..leaves {
                prop_assert!(queue.leave_queue().is_ok());
            }
            prop_assert_eq!(queue.status(), before);
            prop_assert_eq!(api.call_count(&Endpoint::LeaveQueue), 0);
        }
    }
}
