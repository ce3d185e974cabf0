//! Satchel CLI
//!
//! Offline inspection tools for persisted Satchel state.
//!
//! # Commands
//!
//! - `status` - Show sync status of a namespace
//! - `documents` - List documents in the local store
//! - `outbox` - Dump pending outbox intents
//!
//! The CLI takes the namespace's exclusive lock while it runs, so it
//! refuses to inspect state an application currently has open.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Satchel local state inspection tools.
#[derive(Parser)]
#[command(name = "satchel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the state root directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Application id of the namespace
    #[arg(global = true, long, default_value = "satchel")]
    app: String,

    /// User id of the namespace
    #[arg(global = true, long, default_value = "default")]
    user: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show sync status of the namespace
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List documents in the local store
    Documents {
        /// Only show this collection
        #[arg(short, long)]
        collection: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump pending outbox intents
    Outbox {
        /// Include dead-lettered intents
        #[arg(short, long)]
        dead: bool,

        /// Maximum number of intents to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
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
        Commands::Status { format } => {
            let path = cli.path.ok_or("State path required for status")?;
            let state = commands::open_state(&path, &cli.app, &cli.user)?;
            commands::status::run(&state, &format)?;
        }
        Commands::Documents { collection, format } => {
            let path = cli.path.ok_or("State path required for documents")?;
            let state = commands::open_state(&path, &cli.app, &cli.user)?;
            commands::documents::run(&state, collection.as_deref(), &format)?;
        }
        Commands::Outbox {
            dead,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("State path required for outbox")?;
            let state = commands::open_state(&path, &cli.app, &cli.user)?;
            commands::outbox::run(&state, dead, limit, &format)?;
        }
        Commands::Version => {
            println!("Satchel CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("State schema v{}", satchel_store::STATE_VERSION);
        }
    }

    Ok(())
}
