//! Integration tests for clients and the reference server.

use gambit_client::{
    ChallengeStatus, ClientError, GameApi, MoveSubmission, QueueStatus, Refusal, RespondOutcome,
    SessionOutcome, SessionStatus,
};
use gambit_protocol::{ChallengeDecision, GameOverReason, MoveNotation, SessionId};
use gambit_server::{Room, ServerConfig};
use gambit_testkit::{Harness, Player, FOOLS_MATE, SCHOLARS_MATE};
use std::sync::{Arc, Mutex};

type Outcomes = Arc<Mutex<Vec<(SessionId, SessionOutcome)>>>;

fn record_outcomes(player: &Player) -> Outcomes {
    let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = outcomes.clone();
    player
        .session()
        .unwrap()
        .on_outcome(move |id, outcome| sink.lock().unwrap().push((id, outcome.clone())));
    outcomes
}

fn server_position(harness: &Harness, id: SessionId) -> gambit_protocol::Position {
    harness.server().snapshot(id).unwrap().current_fen
}

#[test]
fn challenge_accept_starts_both_sessions() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");

    let starts: Arc<Mutex<Vec<(&str, SessionId)>>> = Arc::new(Mutex::new(Vec::new()));
    for (name, player) in [("alice", &alice), ("bob", &bob)] {
        let sink = starts.clone();
        player
            .client()
            .challenges()
            .on_start(move |id| sink.lock().unwrap().push((name, id)));
    }
    let invites = Arc::new(Mutex::new(Vec::new()));
    let sink = invites.clone();
    bob.client()
        .challenges()
        .on_invite(move |record| sink.lock().unwrap().push(record.challenge_id));

    let sent = alice
        .client()
        .challenges()
        .send_challenge(bob.participant_id())
        .unwrap();
    harness.pump();
    assert_eq!(invites.lock().unwrap().as_slice(), &[sent.challenge_id]);

    let outcome = bob
        .client()
        .challenges()
        .respond(sent.challenge_id, ChallengeDecision::Accept)
        .unwrap();
    let RespondOutcome::Accepted(Some(session_id)) = outcome else {
        panic!("unexpected outcome {outcome:?}");
    };
    harness.pump();

    let mut starts = starts.lock().unwrap().clone();
    starts.sort();
    assert_eq!(starts, vec![("alice", session_id), ("bob", session_id)]);

    for player in [&alice, &bob] {
        let session = player.session().unwrap();
        assert_eq!(session.session_id(), session_id);
        assert_eq!(session.status(), SessionStatus::Active);
        assert!(player.client().challenges().records().is_empty());
    }
    assert_eq!(
        alice.client().challenges().history()[0].status,
        ChallengeStatus::Accepted
    );
    // The challenger plays white.
    assert_eq!(
        alice.session().unwrap().view().white,
        Some(alice.participant_id())
    );
}

#[test]
fn queue_pairing_then_fools_mate() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");

    let session_id = harness.pair_via_queue(&alice, &bob).unwrap();
    assert_eq!(
        alice.client().queue().status(),
        QueueStatus::Paired(session_id)
    );
    assert_eq!(bob.client().queue().status(), QueueStatus::Paired(session_id));

    let alice_outcomes = record_outcomes(&alice);
    let bob_outcomes = record_outcomes(&bob);

    let results = harness.play_line(&alice, &bob, FOOLS_MATE).unwrap();
    assert!(results
        .iter()
        .all(|r| matches!(r, MoveSubmission::Confirmed(_))));

    for (player, outcomes) in [(&alice, &alice_outcomes), (&bob, &bob_outcomes)] {
        let session = player.session().unwrap();
        assert_eq!(session.status(), SessionStatus::Terminated);
        assert_eq!(
            session.current_position(),
            Some(server_position(&harness, session_id))
        );
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, session_id);
        assert_eq!(outcomes[0].1.winner_id, Some(bob.participant_id()));
        assert_eq!(outcomes[0].1.reason, GameOverReason::Checkmate);
    }
}

#[test]
fn scholars_mate_through_challenge() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");

    harness.pair_via_challenge(&alice, &bob).unwrap();
    harness.play_line(&alice, &bob, SCHOLARS_MATE).unwrap();

    let outcome = bob.session().unwrap().outcome().unwrap();
    assert!(outcome.is_win_for(alice.participant_id()));
}

#[test]
fn moving_out_of_turn_is_refused_locally() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");
    let session_id = harness.pair_via_queue(&alice, &bob).unwrap();

    let before = bob.session().unwrap().current_position();
    let result = bob.play("e7e5").unwrap();

    assert_eq!(result, MoveSubmission::Refused(Refusal::NotYourTurn));
    assert_eq!(bob.session().unwrap().current_position(), before);
    assert!(harness.server().move_history(session_id).is_empty());
}

#[test]
fn rejected_move_resyncs_to_server_snapshot() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");
    let session_id = harness.pair_via_queue(&alice, &bob).unwrap();

    // Move behind the session's back so its view is one ply stale.
    alice
        .api()
        .submit_move(session_id, &MoveNotation::parse("e2e4").unwrap())
        .unwrap();

    let result = alice.play("d2d4").unwrap();
    let MoveSubmission::RolledBack { failure, position } = result else {
        panic!("expected a rollback, got {result:?}");
    };
    assert_eq!(failure.failure().map(|f| f.status), Some(403));
    assert_eq!(position, server_position(&harness, session_id));
    assert_eq!(
        alice.session().unwrap().current_position(),
        Some(position.clone())
    );

    // The late push for the move is a duplicate.
    harness.pump();
    assert_eq!(alice.session().unwrap().current_position(), Some(position));
    assert_eq!(alice.session().unwrap().status(), SessionStatus::Active);
}

#[test]
fn declined_draw_returns_to_active() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");
    let session_id = harness.pair_via_queue(&alice, &bob).unwrap();
    harness.play_line(&alice, &bob, &["e2e4"]).unwrap();

    bob.session().unwrap().offer_draw().unwrap();
    harness.pump();

    let alice_session = alice.session().unwrap();
    assert_eq!(alice_session.status(), SessionStatus::DrawPending);
    assert_eq!(alice_session.draw_offered_by(), Some(bob.participant_id()));
    assert!(bob.session().unwrap().view().own_draw_offer);

    let before = alice_session.current_position();
    alice_session.respond_draw(false).unwrap();
    assert_eq!(alice_session.status(), SessionStatus::Active);
    assert_eq!(alice_session.draw_offered_by(), None);
    assert_eq!(alice_session.current_position(), before);

    harness.pump();
    assert!(!bob.session().unwrap().view().own_draw_offer);
    assert_eq!(
        harness.server().snapshot(session_id).unwrap().draw_offer_from,
        None
    );
}

#[test]
fn accepted_draw_ends_without_winner() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");
    harness.pair_via_queue(&alice, &bob).unwrap();

    alice.session().unwrap().offer_draw().unwrap();
    harness.pump();
    bob.session().unwrap().respond_draw(true).unwrap();
    harness.pump();

    for player in [&alice, &bob] {
        let outcome = player.session().unwrap().outcome().unwrap();
        assert!(outcome.is_draw());
        assert_eq!(outcome.reason, GameOverReason::DrawAgreement);
    }
}

#[test]
fn answering_without_offer_is_invalid() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");
    harness.pair_via_queue(&alice, &bob).unwrap();

    let result = alice.session().unwrap().respond_draw(false);
    assert!(matches!(
        result,
        Err(ClientError::InvalidStateTransition { .. })
    ));
}

#[test]
fn resignation_ends_both_sessions() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");
    harness.pair_via_queue(&alice, &bob).unwrap();

    bob.session().unwrap().resign().unwrap();
    harness.pump();

    for player in [&alice, &bob] {
        let outcome = player.session().unwrap().outcome().unwrap();
        assert_eq!(outcome.reason, GameOverReason::Resignation);
        assert_eq!(outcome.winner_id, Some(alice.participant_id()));
    }
    assert!(matches!(
        alice.play("e2e4"),
        Ok(MoveSubmission::Refused(Refusal::NotActive))
    ));
}

#[test]
fn credential_rotation_keeps_session_subscriptions() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");
    let session_id = harness.pair_via_queue(&alice, &bob).unwrap();

    let first = alice.client().connection().handle().unwrap();
    let handlers_before = alice.client().connection().handler_count("move_made");

    // The next request is answered 401, refreshed and retried.
    harness.server().expire_access_tokens(alice.participant_id());
    let result = alice.play("e2e4").unwrap();
    assert!(matches!(result, MoveSubmission::Confirmed(_)));

    let second = alice.client().connection().handle().unwrap();
    assert!(second.generation() > first.generation());
    assert_eq!(
        alice.client().connection().handler_count("move_made"),
        handlers_before
    );
    assert_eq!(
        harness.server().room_members(Room::Game(session_id)).len(),
        2
    );

    harness.pump();
    harness.play_line(&bob, &alice, &["e7e5"]).unwrap();
    assert_eq!(
        alice.session().unwrap().current_position(),
        Some(server_position(&harness, session_id))
    );
    assert_eq!(harness.server().move_history(session_id).len(), 2);
}

#[test]
fn expired_refresh_token_abandons_session() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");
    let session_id = harness.pair_via_queue(&alice, &bob).unwrap();
    let session = alice.session().unwrap();
    assert_eq!(harness.server().connection_count(), 2);

    harness.server().expire_access_tokens(alice.participant_id());
    harness.server().revoke_refresh_tokens(alice.participant_id());

    assert!(matches!(
        alice.play("e2e4"),
        Err(ClientError::CredentialExpired)
    ));
    let view = session.view();
    assert!(!session.is_live());
    assert_eq!(view.status, SessionStatus::Terminated);
    assert!(view.pending_move.is_none());
    assert!(view.outcome.is_none());
    assert!(alice.session().is_none());
    assert!(alice.credentials().current().is_none());
    assert!(!alice.client().connection().is_connected());
    assert_eq!(harness.server().connection_count(), 1);

    // Nothing reached the server; the game is still on for the opponent.
    assert!(harness.server().move_history(session_id).is_empty());
    assert_eq!(bob.session().unwrap().status(), SessionStatus::Active);
}

#[test]
fn logout_closes_the_channel() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let _bob = harness.add_player("bob");
    assert_eq!(harness.server().connection_count(), 2);

    alice.client().logout();

    assert!(!alice.client().connection().is_connected());
    assert!(alice.credentials().current().is_none());
    assert_eq!(harness.server().connection_count(), 1);
}

#[test]
fn leaving_queue_is_idempotent() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let queue = alice.client().queue();

    queue.leave_queue().unwrap();
    assert_eq!(queue.status(), QueueStatus::NotQueued);

    queue.join_queue().unwrap();
    assert_eq!(harness.server().queue_len(), 1);
    queue.leave_queue().unwrap();
    queue.leave_queue().unwrap();
    assert_eq!(queue.status(), QueueStatus::NotQueued);
    assert_eq!(harness.server().queue_len(), 0);
}

#[test]
fn accepting_a_cancelled_challenge_is_already_gone() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");

    let sent = alice
        .client()
        .challenges()
        .send_challenge(bob.participant_id())
        .unwrap();
    harness.pump();
    assert_eq!(alice.client().challenges().cancel_outgoing().unwrap(), 1);

    let outcome = bob
        .client()
        .challenges()
        .respond(sent.challenge_id, ChallengeDecision::Accept)
        .unwrap();
    assert_eq!(outcome, RespondOutcome::AlreadyGone);
    assert!(bob.client().challenges().records().is_empty());
    assert!(bob.session().is_none());
}

#[test]
fn pending_refresh_expires_challenges_the_server_dropped() {
    let harness = Harness::with_server_config(
        ServerConfig::new().with_challenge_ttl(std::time::Duration::from_secs(60)),
    );
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");

    alice
        .client()
        .challenges()
        .send_challenge(bob.participant_id())
        .unwrap();
    harness.pump();
    assert_eq!(bob.client().challenges().refresh_pending().unwrap().len(), 1);

    harness
        .server()
        .advance_clock(std::time::Duration::from_secs(120));
    assert!(bob.client().challenges().refresh_pending().unwrap().is_empty());
    assert_eq!(
        bob.client().challenges().history()[0].status,
        ChallengeStatus::Expired
    );
}

#[test]
fn accepting_a_challenge_leaves_the_queue() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");

    bob.client().queue().join_queue().unwrap();
    assert_eq!(harness.server().queue_len(), 1);

    harness.pair_via_challenge(&alice, &bob).unwrap();
    assert!(!bob.client().queue().is_queued());
    assert_eq!(harness.server().queue_len(), 0);
}

#[test]
fn accepting_an_invite_keeps_own_outgoing_challenge() {
    let harness = Harness::new();
    let alice = harness.add_player("alice");
    let bob = harness.add_player("bob");
    let carol = harness.add_player("carol");

    let to_carol = alice
        .client()
        .challenges()
        .send_challenge(carol.participant_id())
        .unwrap();
    harness.pump();
    let session_id = harness.pair_via_challenge(&bob, &alice).unwrap();

    let outgoing = alice.client().challenges().outgoing();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].challenge_id, to_carol.challenge_id);
    assert_eq!(outgoing[0].status, ChallengeStatus::Pending);
    assert!(alice
        .client()
        .challenges()
        .history()
        .iter()
        .all(|r| r.challenge_id != to_carol.challenge_id));

    // Bob's own record is retired by the start that names it.
    assert!(bob.client().challenges().outgoing().is_empty());
    assert_eq!(
        bob.client().challenges().history()[0].status,
        ChallengeStatus::Accepted
    );
    assert_eq!(alice.session().unwrap().session_id(), session_id);
    assert_eq!(harness.server().challenge_count(), 1);
}
