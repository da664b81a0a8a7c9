use std::path::Path;
use std::sync::Arc;

use tabkeep_core::config::SyncSettings;
use tabkeep_core::sync::{spawn_connectivity_probe, ConnectivityMonitor, StoreChange};
use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::open_session;
use crate::error::CliError;

/// Run the connectivity monitor in the foreground until Ctrl-C.
pub async fn run_watch(db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let session = open_session(db_path, profile).await?;
    if !session.is_remote_configured() {
        return Err(CliError::RemoteNotConfigured);
    }
    let settings = SyncSettings::from_env().map_err(CliError::Config)?;

    let probe = spawn_connectivity_probe(
        Arc::clone(session.gateway()),
        settings.probe_interval,
        session.online.clone(),
    );
    let monitor = ConnectivityMonitor::new(
        Arc::clone(&session.reconciler),
        session.online.subscribe(),
        &settings,
    )
    .spawn();

    let mut status = session.reconciler.subscribe_status();
    let mut changes = session.reconciler.subscribe_changes();
    println!(
        "Watching for changes every {}s (Ctrl-C to stop)",
        settings.sync_interval.as_secs()
    );

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *status.borrow_and_update();
                println!("Status: {state}");
            }
            change = changes.recv() => match change {
                Ok(StoreChange::RecordUpdated(id)) => println!("Updated {id}"),
                Ok(StoreChange::RecordDeleted(id)) => println!("Deleted {id}"),
                Ok(StoreChange::PassFinished) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {skipped} store change notifications");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    monitor.shutdown().await;
    probe.abort();
    Ok(())
}
