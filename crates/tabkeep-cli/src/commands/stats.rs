use std::path::Path;

use tabkeep_core::RecordStats;

use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn run_stats(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let stats = store.record_stats().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        for line in format_stats_lines(&stats) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_stats_lines(stats: &RecordStats) -> Vec<String> {
    let mut lines = vec![
        format!("Records:            {}", stats.total),
        format!("Unsynced:           {}", stats.unsynced),
        format!("Low battery:        {}", stats.low_battery),
        format!("Pending operations: {}", stats.pending_operations),
    ];
    for (label, counts) in [
        ("Screen", &stats.by_screen_condition),
        ("Body", &stats.by_body_condition),
    ] {
        if counts.is_empty() {
            continue;
        }
        let rendered = counts
            .iter()
            .map(|(condition, count)| format!("{condition}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(format!("{label:<20}{rendered}"));
    }
    lines
}
