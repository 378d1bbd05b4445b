//! # tripwire
//!
//! Run a command behind a circuit breaker whose state is kept in a file, so
//! repeated short-lived invocations (cron jobs, hooks, serverless handlers)
//! share one breaker.

mod commands;
mod script;
mod store;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::store::FileStore;

#[derive(Parser)]
#[command(name = "tripwire")]
#[command(about = "Circuit breaker for commands, with file-persisted state")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command if the circuit allows it, recording the outcome
    Run {
        /// Breaker config (YAML, or JSON by extension)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Snapshot file shared between invocations
        #[arg(short, long)]
        state: PathBuf,

        /// Breaker name used in logs and messages
        #[arg(short, long)]
        name: Option<String>,

        /// Command and its arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Print the stored snapshot
    Status {
        /// Snapshot file
        #[arg(short, long)]
        state: PathBuf,
    },

    /// Reset the stored snapshot to CLOSED
    Reset {
        /// Snapshot file
        #[arg(short, long)]
        state: PathBuf,
    },

    /// Replay an outcome script on a simulated clock
    Simulate {
        /// Breaker config (YAML, or JSON by extension)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Tokens: s, f, 3f, +10s, r (restart from snapshot)
        #[arg(long)]
        script: String,

        /// Simulated start time in epoch milliseconds
        #[arg(long, default_value_t = 1_000)]
        start: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli.command).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run {
            config,
            state,
            name,
            command,
        } => {
            let config = commands::load_config(config.as_deref())?;
            let store = FileStore::new(state);
            commands::run(config, &store, name, &command).await
        }
        Commands::Status { state } => {
            println!("{}", commands::status(&FileStore::new(state)).await?);
            Ok(0)
        }
        Commands::Reset { state } => {
            let store = FileStore::new(state);
            commands::reset(&store).await?;
            tracing::info!(path = %store.path().display(), "Snapshot reset");
            Ok(0)
        }
        Commands::Simulate {
            config,
            script,
            start,
        } => {
            let config = commands::load_config(config.as_deref())?;
            let steps = script::parse(&script)?;
            for line in commands::simulate(config, &steps, start).await? {
                println!("{line}");
            }
            Ok(0)
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
