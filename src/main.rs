use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod assistant;
mod classify;
mod commands;
mod config;
mod deps;
mod envfile;
mod inject;
mod notify;
mod orchestrate;
mod platform;
mod repair;
mod session;
mod supervise;

#[derive(Parser)]
#[command(name = "medbay")]
#[command(
    author,
    version,
    about = "Self-healing sandbox provisioning for generated web apps"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write JSON logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a sandbox from a generated project bundle
    Provision {
        /// Path to the bundle JSON file
        bundle: PathBuf,

        /// Directory holding medbay.toml (defaults to the current directory)
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },

    /// Show persisted provisioning sessions
    Status,

    /// Print the preview address for a session
    Preview {
        /// Session id to look up
        session_id: String,

        /// Port to expose (defaults to the configured server port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Tear down a sandbox
    Terminate {
        /// Session id to terminate
        session_id: String,
    },

    /// Remove persisted session records
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("medbay=debug")
    } else {
        EnvFilter::new("medbay=info")
    };

    let registry = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter);

    // The guard must outlive main or buffered file logs are dropped
    let _guard = match &cli.log_file {
        Some(path) => {
            let file = std::fs::File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            registry.with(fmt::layer().json().with_writer(writer)).init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    };

    match cli.command {
        Commands::Provision { bundle, config_dir } => {
            commands::provision::run(bundle, config_dir).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Preview { session_id, port } => {
            commands::preview::run(session_id, port).await?;
        }
        Commands::Terminate { session_id } => {
            commands::terminate::run(session_id).await?;
        }
        Commands::Clean => {
            commands::clean::run().await?;
        }
    }

    Ok(())
}
