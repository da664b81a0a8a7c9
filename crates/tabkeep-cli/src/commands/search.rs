use std::path::Path;

use crate::commands::common::{
    format_record_lines, normalize_search_query, open_store, record_to_list_item, RecordListItem,
};
use crate::error::CliError;

pub async fn run_search(query: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized_query = normalize_search_query(query)?;
    let store = open_store(db_path).await?;
    let records = store.search_records(&normalized_query).await?;

    if as_json {
        let json_items = records
            .iter()
            .map(record_to_list_item)
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if records.is_empty() {
        println!("No records match '{normalized_query}'.");
    } else {
        for line in format_record_lines(&records) {
            println!("{line}");
        }
    }

    Ok(())
}
