//! Request handlers for every endpoint.
//!
//! Handlers run under the server's state lock. They never deliver pushes
//! themselves; they append [`Emit`]s which the server queues once the
//! request completes.

use crate::auth::{TokenClaims, TokenKind, TokenSigner};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::rooms::{Emit, Room};
use crate::state::{ChallengeRecord, GameRecord, ServerState};
use gambit_protocol::{
    decode_body, encode_body, encode_payload, names, BoardOutcome, ChallengeDecision,
    ChallengeId, ChallengeInvite, ChallengeStart, DrawDeclined, DrawOffered, Endpoint, GameOver,
    GameOverReason, HttpRequest, HttpResponse, JoinQueueResponse, MessageResponse, MoveMade,
    MoveNotation, ParticipantId, PendingChallenge, QueuePairing, QueueStatusResponse,
    RefreshResponse, RespondChallengeResponse, RespondDrawRequest, RulesEngine,
    SendChallengeRequest, SendChallengeResponse, SessionId, Side,
};
use serde::Serialize;
use tracing::{debug, info};

/// Everything a handler needs besides the state.
pub(crate) struct Context<'a> {
    pub now: i64,
    pub rules: &'a dyn RulesEngine,
    pub config: &'a ServerConfig,
    pub signer: &'a TokenSigner,
}

fn respond<T: Serialize>(status: u16, body: &T) -> ServerResult<HttpResponse> {
    let body = encode_body(body).map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(HttpResponse::new(status, body))
}

fn message(status: u16, text: &str) -> ServerResult<HttpResponse> {
    respond(status, &MessageResponse::new(text))
}

fn payload<T: Serialize>(value: &T) -> ServerResult<serde_json::Value> {
    encode_payload(value).map_err(|e| ServerError::Internal(e.to_string()))
}

fn read_body<T: serde::de::DeserializeOwned>(request: &HttpRequest) -> ServerResult<T> {
    let bytes = request.body.as_deref().unwrap_or_default();
    decode_body(bytes).map_err(|e| ServerError::BadRequest(e.to_string()))
}

fn internal(e: impl std::fmt::Display) -> ServerError {
    ServerError::Internal(e.to_string())
}

/// Resolves a bearer token to its holder.
pub(crate) fn authenticate(
    state: &ServerState,
    signer: &TokenSigner,
    bearer: Option<&str>,
    kind: TokenKind,
) -> ServerResult<ParticipantId> {
    let token =
        bearer.ok_or_else(|| ServerError::Unauthorized("Missing Authorization Header".into()))?;
    let claims = signer.verify(token)?;
    if claims.kind != kind {
        return Err(ServerError::Unauthorized("Invalid token type".into()));
    }
    let user = state
        .users
        .get(&claims.participant)
        .ok_or_else(|| ServerError::Unauthorized("User not found".into()))?;
    let epoch = match kind {
        TokenKind::Access => user.access_epoch,
        TokenKind::Refresh => user.refresh_epoch,
    };
    if claims.epoch != epoch {
        return Err(ServerError::Unauthorized("Token has expired".into()));
    }
    Ok(claims.participant)
}

/// Routes one request.
pub(crate) fn dispatch(
    state: &mut ServerState,
    ctx: &Context<'_>,
    request: &HttpRequest,
    emits: &mut Vec<Emit>,
) -> ServerResult<HttpResponse> {
    let endpoint = Endpoint::parse(request.method, request.path())
        .map_err(|e| ServerError::NotFound(e.to_string()))?;
    let bearer = request.bearer.as_deref();

    if endpoint == Endpoint::Refresh {
        let user = authenticate(state, ctx.signer, bearer, TokenKind::Refresh)?;
        return refresh(state, ctx, user);
    }

    let user = authenticate(state, ctx.signer, bearer, TokenKind::Access)?;
    debug!(%user, method = %request.method, path = request.path(), "request");

    match endpoint {
        Endpoint::Snapshot(id) => {
            let game = participant_game(state, id, user)?;
            respond(200, &game.snapshot())
        }
        Endpoint::SubmitMove(id, notation) => submit_move(state, ctx, user, id, &notation, emits),
        Endpoint::Resign(id) => resign(state, user, id, emits),
        Endpoint::OfferDraw(id) => offer_draw(state, user, id, emits),
        Endpoint::RespondDraw(id) => {
            let answer: RespondDrawRequest = read_body(request)?;
            respond_draw(state, user, id, answer.accepted, emits)
        }
        Endpoint::ClaimTimeout(id) => claim_timeout(state, ctx, user, id, emits),
        Endpoint::JoinQueue => join_queue(state, ctx, user, emits),
        Endpoint::LeaveQueue => leave_queue(state, user),
        Endpoint::QueueStatus => queue_status(state, user),
        Endpoint::SendChallenge => {
            let req: SendChallengeRequest = read_body(request)?;
            send_challenge(state, ctx, user, req, emits)
        }
        Endpoint::CancelChallenge => cancel_challenge(state, ctx, user),
        Endpoint::PendingChallenges => pending_challenges(state, ctx, user),
        Endpoint::RespondChallenge(id, decision) => {
            respond_challenge(state, ctx, user, id, decision, emits)
        }
        Endpoint::Refresh => Err(ServerError::Internal("unreachable route".into())),
    }
}

fn participant_game(
    state: &ServerState,
    id: SessionId,
    user: ParticipantId,
) -> ServerResult<&GameRecord> {
    let game = state
        .games
        .get(&id)
        .ok_or_else(|| ServerError::NotFound("Game not found".into()))?;
    if !game.involves(user) {
        return Err(ServerError::Unauthorized("Unauthorized".into()));
    }
    Ok(game)
}

/// Looks up a live game the caller plays in.
fn live_game_mut(
    state: &mut ServerState,
    id: SessionId,
    user: ParticipantId,
) -> ServerResult<&mut GameRecord> {
    let game = state
        .games
        .get_mut(&id)
        .ok_or_else(|| ServerError::NotFound("Game not found".into()))?;
    if !game.in_progress {
        return Err(ServerError::BadRequest("Game has already ended".into()));
    }
    if !game.involves(user) {
        return Err(ServerError::Unauthorized("Unauthorized".into()));
    }
    Ok(game)
}

fn game_over(
    game: &mut GameRecord,
    winner: Option<ParticipantId>,
    reason: GameOverReason,
    emits: &mut Vec<Emit>,
) -> ServerResult<()> {
    game.finish(winner);
    info!(session_id = %game.id, ?winner, reason = %reason, "game over");
    emits.push(Emit::new(
        Room::Game(game.id),
        names::GAME_OVER,
        payload(&GameOver {
            winner_id: winner,
            reason,
            game_id: Some(game.id),
        })?,
    ));
    Ok(())
}

fn submit_move(
    state: &mut ServerState,
    ctx: &Context<'_>,
    user: ParticipantId,
    id: SessionId,
    notation: &MoveNotation,
    emits: &mut Vec<Emit>,
) -> ServerResult<HttpResponse> {
    let game = live_game_mut(state, id, user)?;

    let to_move = ctx.rules.side_to_move(&game.position).map_err(internal)?;
    if game.participant(to_move) != user {
        return Err(ServerError::Forbidden("It is not your turn".into()));
    }

    let elapsed = (ctx.now - game.updated_at).max(0);
    if game.clock(to_move) - elapsed <= 0 {
        game.charge_clock(to_move, ctx.now);
        let winner = game.participant(to_move.opposite());
        game_over(game, Some(winner), GameOverReason::TimeOut, emits)?;
        return respond(200, &game.snapshot());
    }

    let next = ctx
        .rules
        .apply_move(&game.position, notation)
        .map_err(|_| ServerError::BadRequest("Illegal move".into()))?;
    // A move withdraws any open draw offer.
    game.draw_offer_from = None;
    game.charge_clock(to_move, ctx.now);
    game.position = next;
    game.moves.push(notation.clone());

    let outcome = ctx.rules.outcome(&game.position).map_err(internal)?;
    emits.push(Emit::new(
        Room::Game(id),
        names::MOVE_MADE,
        payload(&MoveMade {
            notation: notation.clone(),
            current_fen: game.position.clone(),
            is_game_over: outcome.is_some(),
            white_time_left: Some(game.white_clock),
            black_time_left: Some(game.black_clock),
            game_id: Some(id),
        })?,
    ));

    match outcome {
        Some(BoardOutcome::Checkmate { .. }) => {
            game_over(game, Some(user), GameOverReason::Checkmate, emits)?
        }
        Some(BoardOutcome::Stalemate) => game_over(game, None, GameOverReason::Stalemate, emits)?,
        Some(BoardOutcome::InsufficientMaterial) => {
            game_over(game, None, GameOverReason::InsufficientMaterial, emits)?
        }
        None => {}
    }

    respond(200, &game.snapshot())
}

fn resign(
    state: &mut ServerState,
    user: ParticipantId,
    id: SessionId,
    emits: &mut Vec<Emit>,
) -> ServerResult<HttpResponse> {
    let game = live_game_mut(state, id, user)?;
    let winner = if user == game.white {
        game.black
    } else {
        game.white
    };
    game_over(game, Some(winner), GameOverReason::Resignation, emits)?;
    respond(200, &game.snapshot())
}

fn offer_draw(
    state: &mut ServerState,
    user: ParticipantId,
    id: SessionId,
    emits: &mut Vec<Emit>,
) -> ServerResult<HttpResponse> {
    let game = live_game_mut(state, id, user)?;
    game.draw_offer_from = Some(user);
    emits.push(Emit::new(
        Room::Game(id),
        names::DRAW_OFFERED,
        payload(&DrawOffered {
            offerer_id: user,
            game_id: Some(id),
        })?,
    ));
    message(200, "Draw offer sent")
}

fn respond_draw(
    state: &mut ServerState,
    user: ParticipantId,
    id: SessionId,
    accepted: bool,
    emits: &mut Vec<Emit>,
) -> ServerResult<HttpResponse> {
    let game = live_game_mut(state, id, user)?;
    match game.draw_offer_from {
        None => return Err(ServerError::BadRequest("No draw offer to respond to".into())),
        Some(offerer) if offerer == user => {
            return Err(ServerError::Unauthorized("Unauthorized".into()))
        }
        Some(_) => {}
    }

    if !accepted {
        game.draw_offer_from = None;
        emits.push(Emit::new(
            Room::Game(id),
            names::DRAW_DECLINED,
            payload(&DrawDeclined { game_id: Some(id) })?,
        ));
        return message(200, "Draw declined");
    }

    game_over(game, None, GameOverReason::DrawAgreement, emits)?;
    respond(200, &game.snapshot())
}

fn claim_timeout(
    state: &mut ServerState,
    ctx: &Context<'_>,
    user: ParticipantId,
    id: SessionId,
    emits: &mut Vec<Emit>,
) -> ServerResult<HttpResponse> {
    let game = live_game_mut(state, id, user)?;
    let to_move = ctx.rules.side_to_move(&game.position).map_err(internal)?;
    let elapsed = (ctx.now - game.updated_at).max(0);
    if game.clock(to_move) - elapsed > 0 {
        return Err(ServerError::BadRequest("Time has not expired yet".into()));
    }

    game.charge_clock(to_move, ctx.now);
    let winner = game.participant(to_move.opposite());
    // Neither side can mate: a flag fall is still a draw.
    let insufficient = matches!(
        ctx.rules.outcome(&game.position).map_err(internal)?,
        Some(BoardOutcome::InsufficientMaterial)
    );
    if insufficient {
        game_over(game, None, GameOverReason::InsufficientMaterial, emits)?;
    } else {
        game_over(game, Some(winner), GameOverReason::TimeOut, emits)?;
    }
    message(200, "timeout claimed")
}

fn create_game(
    state: &mut ServerState,
    ctx: &Context<'_>,
    white: ParticipantId,
    black: ParticipantId,
) -> SessionId {
    let id = state.next_game_id();
    let game = GameRecord::new(
        id,
        white,
        black,
        ctx.rules.initial_position(),
        ctx.config.initial_clock_secs,
        ctx.now,
    );
    state.games.insert(id, game);
    info!(session_id = %id, %white, %black, "game created");
    id
}

fn join_queue(
    state: &mut ServerState,
    ctx: &Context<'_>,
    user: ParticipantId,
    emits: &mut Vec<Emit>,
) -> ServerResult<HttpResponse> {
    if state.in_queue(user) {
        return Err(ServerError::BadRequest("User already in queue".into()));
    }
    if state.ongoing_game(user).is_some() {
        return Err(ServerError::BadRequest(
            "User is already in an ongoing game".into(),
        ));
    }
    state.queue.push(user);

    if state.queue.len() < 2 {
        return respond(
            201,
            &JoinQueueResponse {
                message: "User added to queue".into(),
                game_id: None,
                white_user_id: None,
                black_user_id: None,
            },
        );
    }

    // White is whoever queued first.
    let white = state.queue.remove(0);
    let black = state.queue.remove(0);
    let id = create_game(state, ctx, white, black);

    for (receiver, opponent, color) in [(white, black, Side::White), (black, white, Side::Black)] {
        emits.push(Emit::new(
            Room::User(receiver),
            names::START_GAME,
            payload(&QueuePairing {
                game_id: id,
                opponent: Some(opponent),
                color: Some(color),
            })?,
        ));
    }

    respond(
        201,
        &JoinQueueResponse {
            message: "Paired".into(),
            game_id: Some(id),
            white_user_id: Some(white),
            black_user_id: Some(black),
        },
    )
}

fn leave_queue(state: &mut ServerState, user: ParticipantId) -> ServerResult<HttpResponse> {
    let Some(index) = state.queue.iter().position(|p| *p == user) else {
        return Err(ServerError::BadRequest("User not in queue".into()));
    };
    state.queue.remove(index);
    message(200, "User removed from queue")
}

fn queue_status(state: &ServerState, user: ParticipantId) -> ServerResult<HttpResponse> {
    let status = match state.ongoing_game(user) {
        Some(game) => QueueStatusResponse {
            paired: true,
            game_id: Some(game.id),
            white_user_id: Some(game.white),
            black_user_id: Some(game.black),
        },
        None => QueueStatusResponse {
            paired: false,
            game_id: None,
            white_user_id: None,
            black_user_id: None,
        },
    };
    respond(200, &status)
}

fn challenge_ttl(ctx: &Context<'_>) -> Option<i64> {
    ctx.config
        .challenge_ttl
        .map(|ttl| i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

fn send_challenge(
    state: &mut ServerState,
    ctx: &Context<'_>,
    user: ParticipantId,
    req: SendChallengeRequest,
    emits: &mut Vec<Emit>,
) -> ServerResult<HttpResponse> {
    state.purge_challenges(ctx.now, challenge_ttl(ctx));

    if user != req.user1_id && user != req.user2_id {
        return Err(ServerError::Unauthorized("Unauthorized".into()));
    }
    let friend = if user == req.user1_id {
        req.user2_id
    } else {
        req.user1_id
    };
    if friend == user || !state.users.contains_key(&friend) {
        return Err(ServerError::BadRequest("Unknown opponent".into()));
    }
    if state.ongoing_game(user).is_some() || state.ongoing_game(friend).is_some() {
        return Err(ServerError::BadRequest(
            "You or friend is already in an ongoing game".into(),
        ));
    }
    if state.challenges.values().any(|c| c.from == req.user1_id) {
        return Err(ServerError::BadRequest(
            "You can only wait for 1 challenge at a time".into(),
        ));
    }

    let id = state.next_challenge_id();
    state.challenges.insert(
        id,
        ChallengeRecord {
            id,
            from: req.user1_id,
            to: req.user2_id,
            created_at: ctx.now,
        },
    );
    emits.push(Emit::new(
        Room::User(friend),
        names::CHALLENGE_INVITE,
        payload(&ChallengeInvite {
            challenge_id: id,
            username: state.username(req.user1_id),
            from_user_id: Some(req.user1_id),
        })?,
    ));
    info!(challenge_id = %id, from = %req.user1_id, to = %req.user2_id, "challenge sent");

    respond(
        201,
        &SendChallengeResponse {
            message: "Friend challenged successfully".into(),
            challenge_id: id,
        },
    )
}

fn cancel_challenge(
    state: &mut ServerState,
    ctx: &Context<'_>,
    user: ParticipantId,
) -> ServerResult<HttpResponse> {
    state.purge_challenges(ctx.now, challenge_ttl(ctx));
    let outgoing: Vec<ChallengeId> = state
        .challenges
        .values()
        .filter(|c| c.from == user)
        .map(|c| c.id)
        .collect();
    if outgoing.is_empty() {
        return message(200, "You havent made any challenges");
    }
    for id in outgoing {
        state.challenges.remove(&id);
    }
    message(200, "Challenge deleted successfully")
}

fn pending_challenges(
    state: &mut ServerState,
    ctx: &Context<'_>,
    user: ParticipantId,
) -> ServerResult<HttpResponse> {
    state.purge_challenges(ctx.now, challenge_ttl(ctx));
    let pending: Vec<PendingChallenge> = state
        .challenges
        .values()
        .filter(|c| c.to == user)
        .map(|c| PendingChallenge {
            challenge_id: c.id,
            username: state.username(c.from),
            from_user_id: Some(c.from),
        })
        .collect();
    respond(200, &pending)
}

fn respond_challenge(
    state: &mut ServerState,
    ctx: &Context<'_>,
    user: ParticipantId,
    id: ChallengeId,
    decision: ChallengeDecision,
    emits: &mut Vec<Emit>,
) -> ServerResult<HttpResponse> {
    state.purge_challenges(ctx.now, challenge_ttl(ctx));
    let challenge = *state
        .challenges
        .get(&id)
        .ok_or_else(|| ServerError::NotFound("Challenge not found".into()))?;
    if user != challenge.to {
        return Err(ServerError::Unauthorized("Unauthorized".into()));
    }
    if state.ongoing_game(challenge.from).is_some() || state.ongoing_game(challenge.to).is_some()
    {
        state.challenges.remove(&id);
        return Err(ServerError::BadRequest(
            "You or challenger is already in an ongoing game".into(),
        ));
    }
    state.challenges.remove(&id);

    match decision {
        ChallengeDecision::Decline => respond(
            200,
            &RespondChallengeResponse {
                message: "Challenge declined".into(),
                game_id: None,
            },
        ),
        ChallengeDecision::Accept => {
            // The challenger plays white.
            let game_id = create_game(state, ctx, challenge.from, challenge.to);
            for receiver in [challenge.from, challenge.to] {
                emits.push(Emit::new(
                    Room::User(receiver),
                    names::START_CHALLENGE,
                    payload(&ChallengeStart {
                        game_id,
                        challenge_id: Some(id),
                    })?,
                ));
            }
            respond(
                200,
                &RespondChallengeResponse {
                    message: "Challenge accepted".into(),
                    game_id: Some(game_id),
                },
            )
        }
    }
}

fn refresh(
    state: &mut ServerState,
    ctx: &Context<'_>,
    user: ParticipantId,
) -> ServerResult<HttpResponse> {
    let record = state
        .users
        .get_mut(&user)
        .ok_or_else(|| ServerError::BadRequest("User not found.".into()))?;
    // Each refresh retires the previous access token.
    record.access_epoch += 1;
    let access_token = ctx.signer.mint(TokenClaims {
        participant: user,
        kind: TokenKind::Access,
        epoch: record.access_epoch,
    })?;
    debug!(%user, "access token refreshed");
    respond(
        200,
        &RefreshResponse {
            access_token,
            username: Some(record.username.clone()),
        },
    )
}
