use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tabkeep_core::config::ENV_DB_PATH;
use tabkeep_core::remote::RemoteGateway;
use tabkeep_core::sync::{MutationReceipt, PassOutcome, Reconciler, SkipReason};
use tabkeep_core::util::normalize_text_option;
use tabkeep_core::{Condition, LocalStore, Record, RecordId, SyncRun};
use tokio::sync::watch;

use crate::cli::RecordForm;
use crate::config_profiles::resolve_remote_config;
use crate::error::CliError;
use crate::gateway::CliGateway;

/// An opened local store wired to the configured remote store
pub struct Session {
    pub reconciler: Arc<Reconciler<CliGateway>>,
    pub online: watch::Sender<bool>,
}

impl Session {
    pub fn store(&self) -> &LocalStore {
        self.reconciler.store()
    }

    pub fn gateway(&self) -> &Arc<CliGateway> {
        self.reconciler.gateway()
    }

    pub fn is_remote_configured(&self) -> bool {
        self.gateway().is_configured()
    }
}

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    #[serde(flatten)]
    pub record: Record,
    pub relative_time: String,
    pub low_battery: bool,
}

pub async fn open_store(path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open_path(path.to_path_buf()).await?)
}

/// Open the store and probe the remote store once for the initial
/// connectivity reading.
pub async fn open_session(path: &Path, profile: Option<&str>) -> Result<Session, CliError> {
    let store = open_store(path).await?;
    let remote_config = resolve_remote_config(profile).map_err(CliError::Config)?;
    let gateway = CliGateway::from_config(remote_config.as_ref())
        .map_err(|error| CliError::Config(error.to_string()))?;

    let reachable = if gateway.is_configured() {
        match gateway.ping().await {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!("Initial connectivity probe failed: {error}");
                !error.is_unavailable()
            }
        }
    } else {
        false
    };

    let (online, connectivity) = watch::channel(reachable);
    let reconciler = Arc::new(Reconciler::new(store, Arc::new(gateway), connectivity));
    Ok(Session { reconciler, online })
}

/// Wait for the instant pass a mutation may have started and describe it.
pub async fn settle_mutation(receipt: MutationReceipt) -> Option<String> {
    let handle = receipt.sync?;
    match handle.await {
        Ok(outcome) => Some(describe_outcome(&outcome)),
        Err(error) => {
            tracing::warn!("Instant sync task ended abnormally: {error}");
            None
        }
    }
}

pub fn describe_outcome(outcome: &PassOutcome) -> String {
    match outcome {
        PassOutcome::Completed(report) if report.is_clean() => format!(
            "Sync completed: pulled {}, pushed {}, drained {}",
            report.pulled, report.pushed, report.drained
        ),
        PassOutcome::Completed(report) => format!(
            "Sync completed with {} failure(s): pulled {}, pushed {}, drained {}",
            report.failures.len(),
            report.pulled,
            report.pushed,
            report.drained
        ),
        PassOutcome::Failed { error, .. } => format!("Sync failed: {error}"),
        PassOutcome::Skipped(SkipReason::Offline) => "Sync skipped: offline".to_string(),
        PassOutcome::Skipped(SkipReason::AlreadyRunning) => {
            "Sync skipped: a pass is already running".to_string()
        }
    }
}

/// Resolve a record by full ID, unique code, or unique ID prefix.
pub async fn resolve_record(query: &str, store: &LocalStore) -> Result<Record, CliError> {
    if let Ok(record_id) = query.parse::<RecordId>() {
        if let Some(record) = store.get_record(&record_id).await? {
            return Ok(record);
        }
    }

    if let Some(record) = store.find_by_unique_code(query).await? {
        return Ok(record);
    }

    let prefix = query.to_ascii_lowercase();
    let mut matching = store
        .list_records()
        .await?
        .into_iter()
        .filter(|record| record.id.as_str().starts_with(&prefix))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::RecordNotFound(query.to_string())),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|record| short_id(&record.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousRecordId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Copy every provided form field onto `record`.
pub fn apply_form(record: &mut Record, form: &RecordForm) -> Result<(), CliError> {
    if let Some(code) = normalize_text_option(form.code.clone()) {
        record.unique_code = code;
    }
    if let Some(serial) = form.serial.clone() {
        record.serial_number = normalize_text_option(Some(serial));
    }
    if let Some(model) = form.model.clone() {
        record.model = normalize_text_option(Some(model));
    }
    if let Some(product) = form.product.clone() {
        record.product_name = normalize_text_option(Some(product));
    }
    if let Some(site) = form.site.clone() {
        record.origin_site = normalize_text_option(Some(site));
    }
    if let Some(screen) = form.screen.as_deref() {
        record.screen_condition = parse_condition("screen", screen)?;
    }
    if let Some(body) = form.body.as_deref() {
        record.body_condition = parse_condition("body", body)?;
    }
    if let Some(battery) = form.battery {
        record.battery_level = Some(battery);
    }
    if let Some(charger) = form.charger {
        record.has_charger = charger;
    }
    if let Some(case) = form.case {
        record.has_case = case;
    }
    if let Some(notes) = form.notes.clone() {
        record.notes = normalize_text_option(Some(notes));
    }
    if let Some(maintenance) = form.maintenance.as_deref() {
        record.maintenance_date = parse_maintenance_date(maintenance)?;
    }
    Ok(())
}

fn parse_condition(field: &'static str, value: &str) -> Result<Condition, CliError> {
    value.parse::<Condition>().map_err(|_| CliError::InvalidField {
        field,
        message: format!("'{value}' is not one of good, fair, damaged, broken"),
    })
}

/// Parse `YYYY-MM-DD`; an empty value clears the date.
pub fn parse_maintenance_date(value: &str) -> Result<Option<NaiveDate>, CliError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(Some)
        .map_err(|error| CliError::InvalidField {
            field: "maintenance",
            message: format!("'{value}': {error}"),
        })
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySearchQuery)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_record_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRecordId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn short_id(id: &RecordId) -> String {
    id.as_str().chars().take(13).collect()
}

pub fn format_record_lines(records: &[Record]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let battery = record
                .battery_level
                .map_or_else(|| "-".to_string(), |level| format!("{level}%"));
            let model = record.model.as_deref().unwrap_or("-");
            let sync_marker = if record.synced { " " } else { "*" };
            let relative_time = record
                .updated_at
                .map_or_else(String::new, |updated_at| {
                    format_relative_time(updated_at, now_ms)
                });

            format!(
                "{sync_marker} {:<13}  {:<16}  {model:<16}  {battery:>4}  {}/{}  {relative_time}",
                short_id(&record.id),
                record.unique_code,
                record.screen_condition,
                record.body_condition,
            )
        })
        .collect()
}

pub fn record_to_list_item(record: &Record) -> RecordListItem {
    let now_ms = Utc::now().timestamp_millis();
    RecordListItem {
        relative_time: record
            .updated_at
            .map_or_else(String::new, |updated_at| {
                format_relative_time(updated_at, now_ms)
            }),
        low_battery: record.is_low_battery(),
        record: record.clone(),
    }
}

pub fn format_sync_run_lines(runs: &[SyncRun]) -> Vec<String> {
    runs.iter()
        .map(|run| {
            let line = format!(
                "{}  {:<7}  pulled={} pushed={} drained={} failures={}",
                format_sync_timestamp(run.finished_at),
                run.outcome,
                run.pulled,
                run.pushed,
                run.drained,
                run.failures
            );
            match run.error.as_deref() {
                Some(error) => format!("{line}  error={error}"),
                None => line,
            }
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("tabkeep").join("tabkeep.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}
