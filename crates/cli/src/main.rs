//! StudyPass CLI - Database migrations and record maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! sp-cli migrate
//!
//! # Repair one user record and print its canonical state
//! sp-cli repair 42
//!
//! # Report drifted records without writing
//! sp-cli repair-all --dry-run
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `repair` - Repair a single user record
//! - `repair-all` - Repair (or audit) every stored record

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "sp-cli")]
#[command(author, version, about = "StudyPass CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Repair one user record and print the canonical state
    Repair {
        /// User id
        user_id: i32,
    },
    /// Repair every stored user record
    RepairAll {
        /// Report drift without writing anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Repair { user_id } => commands::repair::one(user_id).await?,
        Commands::RepairAll { dry_run } => {
            let summary = commands::repair::all(dry_run).await?;
            if summary.failed > 0 {
                return Err(format!("{} record(s) could not be repaired", summary.failed).into());
            }
        }
    }
    Ok(())
}
