use std::path::Path;

use tabkeep_core::PendingOperation;

use crate::commands::common::{format_sync_timestamp, open_store};
use crate::error::CliError;

pub async fn run_pending(as_json: bool, purge: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    if purge {
        let purged = store.purge_synced_operations().await?;
        println!("Purged {purged} confirmed operation(s)");
    }

    let operations = store.pending_operations().await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&operations)?);
        return Ok(());
    }

    if operations.is_empty() {
        println!("No pending operations.");
        return Ok(());
    }

    for line in format_operation_lines(&operations) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_operation_lines(operations: &[PendingOperation]) -> Vec<String> {
    operations
        .iter()
        .map(|operation| {
            let state = if operation.synced { "synced" } else { "pending" };
            let code = operation
                .payload
                .as_ref()
                .map_or("-", |payload| payload.unique_code.as_str());
            format!(
                "{}  {:<6}  {state:<7}  record={}  code={code}",
                format_sync_timestamp(operation.created_at),
                operation.kind.to_string(),
                operation.record_id
            )
        })
        .collect()
}
