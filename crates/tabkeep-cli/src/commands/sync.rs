use std::path::Path;

use serde::Serialize;
use tabkeep_core::sync::PassOutcome;
use tabkeep_core::{SyncRun, SyncState};

use crate::commands::common::{describe_outcome, format_sync_run_lines, open_session};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusItem {
    pub remote_configured: bool,
    pub state: String,
    pub unsynced_records: usize,
    pub pending_operations: usize,
    pub recent_runs: Vec<SyncRun>,
}

pub async fn run_sync(db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let session = open_session(db_path, profile).await?;
    if !session.is_remote_configured() {
        return Err(CliError::RemoteNotConfigured);
    }

    let outcome = session.reconciler.trigger_sync(true).await;
    println!("{}", describe_outcome(&outcome));

    match outcome {
        PassOutcome::Completed(report) => {
            for failure in &report.failures {
                let record = failure
                    .record_id
                    .map_or_else(|| "-".to_string(), |id| id.to_string());
                println!("  {} {record}: {}", failure.phase, failure.message);
            }
            Ok(())
        }
        PassOutcome::Failed { error, .. } => Err(CliError::SyncFailed(error)),
        PassOutcome::Skipped(_) => Ok(()),
    }
}

pub async fn run_status(
    limit: usize,
    as_json: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let session = open_session(db_path, profile).await?;
    let store = session.store();
    let state = if session.reconciler.is_online() {
        SyncState::Online
    } else {
        SyncState::Offline
    };

    let status = StatusItem {
        remote_configured: session.is_remote_configured(),
        state: state.to_string(),
        unsynced_records: store.unsynced_records().await?.len(),
        pending_operations: store.unsynced_operations().await?.len(),
        recent_runs: store.list_sync_runs(limit).await?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if status.remote_configured {
        println!("Status:             {}", status.state);
    } else {
        println!("Status:             local only (no remote store configured)");
    }
    println!("Unsynced records:   {}", status.unsynced_records);
    println!("Pending operations: {}", status.pending_operations);
    if status.recent_runs.is_empty() {
        println!("No sync passes recorded.");
    } else {
        println!("Recent passes:");
        for line in format_sync_run_lines(&status.recent_runs) {
            println!("  {line}");
        }
    }
    Ok(())
}
