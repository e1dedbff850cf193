//! Gambit CLI
//!
//! Runs scripted matches between in-process clients and the reference
//! server.
//!
//! # Commands
//!
//! - `simulate queue` - Pair two players through the matchmaking queue
//! - `simulate challenge` - Pair two players through a challenge
//! - `lines` - List the built-in opening lines

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Gambit match simulator.
#[derive(Parser)]
#[command(name = "gambit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a scripted match between two clients
    Simulate {
        /// How the two players are paired
        #[arg(value_enum)]
        pairing: commands::simulate::PairingMode,

        /// Built-in line to play (see `gambit lines`)
        #[arg(short, long, default_value = "fools-mate")]
        line: String,

        /// Space-separated moves in coordinate notation; overrides --line
        #[arg(short, long)]
        moves: Option<String>,

        /// Seconds on each clock
        #[arg(long, default_value = "600")]
        clock: i64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List the built-in opening lines
    Lines,

    /// Show version information
    Version,
}

/// Transcript output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON document
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            pairing,
            line,
            moves,
            clock,
            format,
        } => {
            let moves: Vec<String> = match moves {
                Some(moves) => moves.split_whitespace().map(str::to_string).collect(),
                None => commands::simulate::named_line(&line)?,
            };
            commands::simulate::run(pairing, &moves, clock, format)?;
        }
        Commands::Lines => {
            for name in commands::simulate::LINE_NAMES {
                println!("{name}");
            }
        }
        Commands::Version => {
            println!("Gambit CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
