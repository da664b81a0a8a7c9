use std::path::Path;

use crate::commands::common::{format_record_lines, open_store, record_to_list_item, RecordListItem};
use crate::error::CliError;

pub async fn run_list(unsynced: bool, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let records = if unsynced {
        store.unsynced_records().await?
    } else {
        store.list_records().await?
    };

    if as_json {
        let json_items = records
            .iter()
            .map(record_to_list_item)
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_record_lines(&records) {
            println!("{line}");
        }
    }

    Ok(())
}
