use std::path::Path;

use tabkeep_core::sync::LocalMutation;

use crate::cli::RecordForm;
use crate::commands::common::{
    apply_form, normalize_record_identifier, open_session, resolve_record, settle_mutation,
};
use crate::error::CliError;

pub async fn run_edit(
    id: &str,
    form: &RecordForm,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let normalized_id = normalize_record_identifier(id)?;
    let session = open_session(db_path, profile).await?;
    let record = resolve_record(&normalized_id, session.store()).await?;

    let mut edited = record.clone();
    apply_form(&mut edited, form)?;
    if edited == record {
        println!("{}", record.id);
        return Ok(());
    }

    let receipt = session
        .reconciler
        .record_local_mutation(LocalMutation::Update(edited))
        .await?;
    println!("{}", receipt.operation.record_id);
    if let Some(summary) = settle_mutation(receipt).await {
        tracing::info!("{summary}");
    }
    Ok(())
}
