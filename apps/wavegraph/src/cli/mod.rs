//! # Wavegraph CLI Module
//!
//! This module implements the CLI interface for Wavegraph.
//!
//! ## Available Commands
//!
//! - `serve` - Start the HTTP/WebSocket server
//! - `add-point` - Record a point for a node
//! - `snapshot` - Show a node's current signal
//! - `history` - Show a node's point history
//! - `connect` - Connect two nodes
//! - `compact` - Compact the signal database in place

mod commands;

use crate::config::{DEFAULT_CONFIG_FILE, DEFAULT_DATABASE, FileConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use wavegraph_core::WavegraphError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Wavegraph - Live Signal Server
///
/// A graph of nodes accumulating timestamped points, deriving periodic
/// decaying signals, and streaming them live to subscribers.
#[derive(Parser, Debug)]
#[command(name = "wavegraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the signal database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Use a volatile in-memory store instead of the database
    #[arg(short = 'M', long, global = true)]
    pub in_memory: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP/WebSocket server
    Serve {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Record a point for a node (creates the node on first sight)
    AddPoint {
        /// Node uuid
        #[arg(short, long)]
        node: String,

        /// Event time in epoch seconds (defaults to now)
        #[arg(short, long)]
        time: Option<f64>,
    },

    /// Show a node's current signal
    Snapshot {
        /// Node uuid
        #[arg(short, long)]
        node: String,
    },

    /// Show a node's point history, newest first
    History {
        /// Node uuid
        #[arg(short, long)]
        node: String,

        /// Newest timestamp to include, epoch seconds (defaults to now)
        #[arg(short, long)]
        anchor: Option<f64>,

        /// Range below the anchor, in seconds (unbounded when omitted)
        #[arg(short, long)]
        window: Option<f64>,

        /// Maximum number of points
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Connect two nodes, from -> to
    Connect {
        /// Source node uuid
        #[arg(short, long)]
        from: String,

        /// Target node uuid
        #[arg(short, long)]
        to: String,
    },

    /// Compact the signal database in place
    Compact,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), WavegraphError> {
    let explicit_config = cli.config.is_some();
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = FileConfig::load(&config_path, explicit_config)?;

    let database = cli
        .database
        .or(config.database.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(&database, cli.in_memory, &config, host, port).await
        }
        Commands::AddPoint { node, time } => {
            cmd_add_point(&open(&database, cli.in_memory)?, &node, time, json_mode).await
        }
        Commands::Snapshot { node } => {
            cmd_snapshot(&open(&database, cli.in_memory)?, &node, json_mode).await
        }
        Commands::History {
            node,
            anchor,
            window,
            limit,
        } => {
            cmd_history(
                &open(&database, cli.in_memory)?,
                &node,
                anchor,
                window,
                limit,
                json_mode,
            )
            .await
        }
        Commands::Connect { from, to } => {
            cmd_connect(&open(&database, cli.in_memory)?, &from, &to, json_mode).await
        }
        Commands::Compact => cmd_compact(&database, cli.in_memory, json_mode).await,
    }
}

/// Open the one-shot command engine against the database.
///
/// One-shot commands over an in-memory store only ever see their own
/// writes; still allowed, mostly for smoke tests.
fn open(database: &Path, in_memory: bool) -> Result<CliEngine, WavegraphError> {
    CliEngine::open(database, in_memory)
}
