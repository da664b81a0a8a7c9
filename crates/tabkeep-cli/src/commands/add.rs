use std::path::Path;

use tabkeep_core::sync::LocalMutation;
use tabkeep_core::Record;

use crate::cli::RecordForm;
use crate::commands::common::{apply_form, open_session, settle_mutation};
use crate::error::CliError;

pub async fn run_add(
    form: &RecordForm,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let record = build_record(form)?;

    let session = open_session(db_path, profile).await?;
    if let Some(existing) = session.store().find_by_unique_code(&record.unique_code).await? {
        tracing::warn!(
            "Unique code '{}' is already used locally by {}",
            existing.unique_code,
            existing.id
        );
    }

    let receipt = session
        .reconciler
        .record_local_mutation(LocalMutation::Insert(record))
        .await?;
    if let Some(record) = receipt.record.as_ref() {
        println!("{}", record.id);
    }
    if let Some(summary) = settle_mutation(receipt).await {
        tracing::info!("{summary}");
    }
    Ok(())
}

/// Build a new record from the form; `--code` is mandatory.
pub fn build_record(form: &RecordForm) -> Result<Record, CliError> {
    let mut record = Record::new(String::new());
    apply_form(&mut record, form)?;
    if record.unique_code.is_empty() {
        return Err(CliError::InvalidField {
            field: "code",
            message: "a unique code is required".to_string(),
        });
    }
    record.validate()?;
    Ok(record)
}
