//! logship CLI
//!
//! Command-line tools for the agent's WAL segment marker.
//!
//! # Commands
//!
//! - `inspect` - Show the marker file and the checkpoint it holds
//! - `verify` - Check that the marker file decodes
//! - `set` - Overwrite the checkpoint
//! - `reset` - Remove the marker so the WAL is replayed from the start
//! - `resume` - Show where a WAL reader would resume and what can be deleted

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// logship segment marker tools.
#[derive(Parser)]
#[command(name = "logship")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the client's WAL directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the marker file and the checkpoint it holds
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check that the marker file decodes
    Verify,

    /// Overwrite the checkpoint with a segment number
    Set {
        /// Segment to record as fully delivered
        segment: u64,
    },

    /// Remove the marker file
    Reset {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the resume point and truncatable segments
    Resume {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("WAL path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("WAL path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Set { segment } => {
            let path = cli.path.ok_or("WAL path required for set")?;
            commands::mark::set(&path, segment)?;
        }
        Commands::Reset { yes } => {
            let path = cli.path.ok_or("WAL path required for reset")?;
            commands::mark::reset(&path, yes)?;
        }
        Commands::Resume { format } => {
            let path = cli.path.ok_or("WAL path required for resume")?;
            commands::resume::run(&path, &format)?;
        }
        Commands::Version => {
            println!("logship CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("logship marker v{}", logship_marker::VERSION);
        }
    }

    Ok(())
}
