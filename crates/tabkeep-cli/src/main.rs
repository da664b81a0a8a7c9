//! Tabkeep CLI - tablet inventory from the command line
//!
//! Records are written to the local store first and reconciled with the
//! shared remote store whenever it is reachable.

mod cli;
mod commands;
mod config_profiles;
mod error;
mod gateway;

#[cfg(test)]
mod tests;

use std::path::Path;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::resolve_db_path;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::pending::run_pending;
use crate::commands::profile::run_profile;
use crate::commands::search::run_search;
use crate::commands::stats::run_stats;
use crate::commands::sync::{run_status, run_sync};
use crate::commands::watch::run_watch;
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

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tabkeep=info,tabkeep_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Config { command } => run_config(command, profile),
        command => {
            let db_path = resolve_db_path(cli.db_path)?;
            dispatch(command, &db_path, profile).await
        }
    }
}

async fn dispatch(command: Commands, db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    match command {
        Commands::Add { form } => run_add(&form, db_path, profile).await,
        Commands::Edit { id, form } => run_edit(&id, &form, db_path, profile).await,
        Commands::Delete { id } => run_delete(&id, db_path, profile).await,
        Commands::List { unsynced, json } => run_list(unsynced, json, db_path).await,
        Commands::Search { query, json } => run_search(&query, json, db_path).await,
        Commands::Stats { json } => run_stats(json, db_path).await,
        Commands::Pending { json, purge } => run_pending(json, purge, db_path).await,
        Commands::Sync => run_sync(db_path, profile).await,
        Commands::Status { limit, json } => run_status(limit, json, db_path, profile).await,
        Commands::Watch => run_watch(db_path, profile).await,
        Commands::Profile { command } => run_profile(command, db_path).await,
        Commands::Config { command } => run_config(command, profile),
    }
}
