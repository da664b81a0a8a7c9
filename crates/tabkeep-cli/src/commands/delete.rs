use std::path::Path;

use tabkeep_core::sync::LocalMutation;

use crate::commands::common::{
    normalize_record_identifier, open_session, resolve_record, settle_mutation,
};
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let normalized_id = normalize_record_identifier(id)?;
    let session = open_session(db_path, profile).await?;
    let record = resolve_record(&normalized_id, session.store()).await?;

    let receipt = session
        .reconciler
        .record_local_mutation(LocalMutation::Delete(record.id))
        .await?;
    println!("{}", record.id);
    if let Some(summary) = settle_mutation(receipt).await {
        tracing::info!("{summary}");
    }
    Ok(())
}
