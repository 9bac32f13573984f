//! TrueHeart CLI - bookmarks, notes and reading positions from the terminal
//!
//! Every change is written to the local database first and synced to the
//! configured remote when the profile is signed in.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::bookmark::run_bookmark;
use crate::commands::common::{resolve_db_path, SessionSettings};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::device::run_device;
use crate::commands::note::run_note;
use crate::commands::position::run_position;
use crate::commands::setting::run_setting;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "trueheart=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Config { command } => run_config(command, profile),
        Commands::Auth { command } => run_auth(command, profile),
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
        command => {
            let db_path = resolve_db_path(cli.db_path)?;
            let settings = SessionSettings::resolve(db_path, profile)?;
            run_session_command(command, &settings).await
        }
    }
}

async fn run_session_command(
    command: Commands,
    settings: &SessionSettings,
) -> Result<(), CliError> {
    match command {
        Commands::Bookmark { command } => run_bookmark(command, settings).await,
        Commands::Note { command } => run_note(command, settings).await,
        Commands::Position { command } => run_position(command, settings).await,
        Commands::Setting { command } => run_setting(command, settings).await,
        Commands::Sync => run_sync(settings).await,
        Commands::Status { json } => run_status(settings, json).await,
        Commands::Device => run_device(settings).await,
        Commands::Config { .. } | Commands::Auth { .. } | Commands::Completions { .. } => {
            Err(CliError::InvalidInput(
                "command does not use a local database".to_string(),
            ))
        }
    }
}
