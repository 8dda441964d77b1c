use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod cmd;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(version, about = "Phase-sequenced workflow reconciler")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a cadence project (.cadence directory, sample config)
    Init,
    /// Provision a workflow instance and reconcile it to a terminal state
    Run {
        /// Resume an existing instance instead of provisioning a new one
        #[arg(long)]
        resume: Option<Uuid>,

        /// Override the poll interval from cadence.toml
        #[arg(long)]
        poll_interval_secs: Option<u64>,
    },
    /// Show workflow status (all instances, or one)
    Status {
        id: Option<Uuid>,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// List the phases of the workflow definition
    List,
    /// Cancel a running workflow (forces a failed terminal state)
    Cancel {
        id: Uuid,

        #[arg(short, long, default_value = "cancelled by operator")]
        reason: String,
    },
    /// Reclaim environments of terminal workflows past their retention window
    Reclaim,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "cadence=debug"
    } else {
        "cadence=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Run {
            resume,
            poll_interval_secs,
        } => cmd::cmd_run(&project_dir, *resume, *poll_interval_secs).await?,
        Commands::Status { id, json } => cmd::cmd_status(&project_dir, *id, *json)?,
        Commands::List => cmd::cmd_list(&project_dir)?,
        Commands::Cancel { id, reason } => cmd::cmd_cancel(&project_dir, id, reason)?,
        Commands::Reclaim => cmd::cmd_reclaim(&project_dir)?,
    }

    Ok(())
}
