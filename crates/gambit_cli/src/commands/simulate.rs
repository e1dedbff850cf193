//! Simulate command implementation.

use crate::OutputFormat;
use clap::ValueEnum;
use gambit_client::{ClientError, GameSessionMachine, MoveSubmission, SessionStatus};
use gambit_protocol::ParticipantId;
use gambit_server::ServerConfig;
use gambit_testkit::{lines, Harness, Player};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Names accepted by `--line`.
pub const LINE_NAMES: &[&str] = &["fools-mate", "scholars-mate", "italian"];

/// How the simulated players find each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PairingMode {
    /// Both join the matchmaking queue
    Queue,
    /// White challenges black, black accepts
    Challenge,
}

/// Simulation failures.
#[derive(Error, Debug)]
pub enum SimulateError {
    /// `--line` named no built-in line.
    #[error("unknown line: {0}")]
    UnknownLine(String),

    /// A client call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A player was expected to be in a session.
    #[error("{0} is not in a session")]
    NoSession(String),
}

/// One ply of the transcript.
#[derive(Debug, Serialize)]
pub struct Ply {
    /// Ply number, starting at 1.
    pub ply: usize,
    /// Moving player.
    pub player: String,
    /// Move in coordinate notation.
    pub notation: String,
    /// How the client resolved the move.
    pub result: String,
    /// Position after the move, as the mover sees it.
    pub position: String,
}

/// A finished simulation.
#[derive(Debug, Serialize)]
pub struct Transcript {
    /// Pairing path used.
    pub pairing: String,
    /// Session id.
    pub session_id: i64,
    /// Plies in order.
    pub plies: Vec<Ply>,
    /// Final session status.
    pub status: String,
    /// Winning player, if any.
    pub winner: Option<String>,
    /// Reason the game ended, if it did.
    pub reason: Option<String>,
}

/// Resolves a built-in line by name.
pub fn named_line(name: &str) -> Result<Vec<String>, SimulateError> {
    lines::by_name(name)
        .map(|line| line.iter().map(|m| m.to_string()).collect())
        .ok_or_else(|| SimulateError::UnknownLine(name.to_string()))
}

/// Runs the simulate command.
pub fn run(
    pairing: PairingMode,
    moves: &[String],
    clock: i64,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let transcript = simulate(pairing, moves, clock)?;
    match format {
        OutputFormat::Text => print_text(&transcript),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&transcript)?),
    }
    Ok(())
}

/// Plays `moves` between two fresh players and records what each client saw.
pub fn simulate(
    pairing: PairingMode,
    moves: &[String],
    clock: i64,
) -> Result<Transcript, SimulateError> {
    let harness = Harness::with_server_config(ServerConfig::new().with_initial_clock(clock));
    let white = harness.add_player("white");
    let black = harness.add_player("black");

    let session_id = match pairing {
        PairingMode::Queue => harness.pair_via_queue(&white, &black)?,
        PairingMode::Challenge => harness.pair_via_challenge(&white, &black)?,
    };
    info!(%session_id, ?pairing, "players paired");

    let mut plies = Vec::with_capacity(moves.len());
    for (index, uci) in moves.iter().enumerate() {
        let mover = if index % 2 == 0 { &white } else { &black };
        let session = session_of(mover)?;
        if session.status() == SessionStatus::Terminated {
            warn!(remaining = moves.len() - index, "game ended before the line did");
            break;
        }
        let submission = mover.play(uci)?;
        harness.pump();
        plies.push(Ply {
            ply: index + 1,
            player: mover.name().to_string(),
            notation: uci.clone(),
            result: describe(&submission),
            position: session
                .current_position()
                .map(|p| p.to_string())
                .unwrap_or_default(),
        });
    }

    let session = session_of(&white)?;
    let outcome = session.outcome();
    let name_of = |id: ParticipantId| {
        [&white, &black]
            .into_iter()
            .find(|p| p.participant_id() == id)
            .map(|p| p.name().to_string())
    };

    Ok(Transcript {
        pairing: format!("{pairing:?}").to_lowercase(),
        session_id: session_id.get(),
        plies,
        status: session.status().to_string(),
        winner: outcome
            .as_ref()
            .and_then(|o| o.winner_id)
            .and_then(name_of),
        reason: outcome.map(|o| o.reason.tag().to_string()),
    })
}

fn session_of(player: &Player) -> Result<GameSessionMachine, SimulateError> {
    player
        .session()
        .ok_or_else(|| SimulateError::NoSession(player.name().to_string()))
}

fn describe(submission: &MoveSubmission) -> String {
    match submission {
        MoveSubmission::Confirmed(_) => "confirmed".to_string(),
        MoveSubmission::Refused(refusal) => format!("refused ({refusal:?})"),
        MoveSubmission::RolledBack { failure, .. } => format!("rolled back ({failure})"),
        MoveSubmission::Ignored => "ignored".to_string(),
    }
}

fn print_text(transcript: &Transcript) {
    println!(
        "Session {} ({} pairing)",
        transcript.session_id, transcript.pairing
    );
    println!();
    for ply in &transcript.plies {
        println!(
            "{:>3}. {:<6} {:<6} {:<24} {}",
            ply.ply, ply.player, ply.notation, ply.result, ply.position
        );
    }
    println!();
    match (&transcript.winner, &transcript.reason) {
        (Some(winner), Some(reason)) => println!("Result: {winner} wins by {reason}"),
        (None, Some(reason)) => println!("Result: draw ({reason})"),
        _ => println!("Status: {}", transcript.status),
    }
}
