use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use pretty_assertions::assert_eq;
use tabkeep_core::sync::{LocalMutation, PassOutcome, Reconciler, SkipReason, SyncReport};
use tabkeep_core::{Condition, LocalStore, OperationKind, Record, RecordStats, Role, SyncRun};
use tokio::sync::watch;

use crate::cli::{Cli, Commands, RecordForm};
use crate::commands::add::build_record;
use crate::commands::common::{
    apply_form, describe_outcome, format_record_lines, format_relative_time,
    format_sync_run_lines, normalize_record_identifier, normalize_search_query,
    parse_maintenance_date, record_to_list_item, resolve_record, settle_mutation, short_id,
};
use crate::commands::config::{merge_profile, ProfileFields};
use crate::commands::pending::format_operation_lines;
use crate::commands::profile::{build_profile, format_profile};
use crate::commands::stats::format_stats_lines;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;
use crate::gateway::CliGateway;

fn unique_test_db_path() -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());

    std::env::temp_dir().join(format!(
        "tabkeep-cli-test-{}-{nanos}-{counter}.db",
        std::process::id()
    ))
}

fn form(code: &str) -> RecordForm {
    RecordForm {
        code: Some(code.to_string()),
        ..RecordForm::default()
    }
}

fn detached_reconciler(store: LocalStore) -> Arc<Reconciler<CliGateway>> {
    let (_online, connectivity) = watch::channel(false);
    Arc::new(Reconciler::new(
        store,
        Arc::new(CliGateway::Detached),
        connectivity,
    ))
}

#[test]
fn add_command_parses_form_flags() {
    let cli = Cli::try_parse_from([
        "tabkeep",
        "add",
        "--code",
        "TAB-2024-0001",
        "--battery",
        "80",
        "--screen",
        "fair",
        "--charger",
        "true",
        "--maintenance",
        "2024-03-01",
    ])
    .unwrap();

    let Commands::Add { form } = cli.command else {
        panic!("expected add command");
    };
    assert_eq!(form.code.as_deref(), Some("TAB-2024-0001"));
    assert_eq!(form.battery, Some(80));
    assert_eq!(form.charger, Some(true));
    assert_eq!(form.case, None);
}

#[test]
fn global_profile_flag_follows_subcommand() {
    let cli = Cli::try_parse_from(["tabkeep", "sync", "--profile", "field"]).unwrap();
    assert_eq!(cli.profile.as_deref(), Some("field"));
    assert!(matches!(cli.command, Commands::Sync));
}

#[test]
fn build_record_requires_code_and_valid_battery() {
    let error = build_record(&RecordForm::default()).unwrap_err();
    assert!(matches!(error, CliError::InvalidField { field: "code", .. }));

    let mut invalid = form("TAB-1");
    invalid.battery = Some(101);
    assert!(matches!(
        build_record(&invalid).unwrap_err(),
        CliError::Core(tabkeep_core::Error::InvalidInput(_))
    ));

    let mut valid = form("  TAB-1 ");
    valid.model = Some("Galaxy Tab A8".to_string());
    valid.body = Some("Damaged".to_string());
    let record = build_record(&valid).unwrap();
    assert_eq!(record.unique_code, "TAB-1");
    assert_eq!(record.model.as_deref(), Some("Galaxy Tab A8"));
    assert_eq!(record.body_condition, Condition::Damaged);
    assert!(!record.synced);
}

#[test]
fn apply_form_clears_optional_text_and_rejects_bad_values() {
    let mut record = Record::new("TAB-1");
    record.notes = Some("cracked corner".to_string());

    let clear_notes = RecordForm {
        notes: Some("  ".to_string()),
        ..RecordForm::default()
    };
    apply_form(&mut record, &clear_notes).unwrap();
    assert_eq!(record.notes, None);

    let bad_screen = RecordForm {
        screen: Some("shattered".to_string()),
        ..RecordForm::default()
    };
    assert!(matches!(
        apply_form(&mut record, &bad_screen).unwrap_err(),
        CliError::InvalidField { field: "screen", .. }
    ));
}

#[test]
fn maintenance_date_parsing() {
    assert_eq!(parse_maintenance_date(" ").unwrap(), None);
    assert_eq!(
        parse_maintenance_date("2024-03-01").unwrap().map(|date| date.to_string()),
        Some("2024-03-01".to_string())
    );
    assert!(parse_maintenance_date("03/01/2024").is_err());
}

#[test]
fn identifier_and_query_normalization() {
    assert!(matches!(
        normalize_record_identifier("  "),
        Err(CliError::EmptyRecordId)
    ));
    assert_eq!(normalize_record_identifier(" abc ").unwrap(), "abc");
    assert!(matches!(
        normalize_search_query(" \t"),
        Err(CliError::EmptySearchQuery)
    ));
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn record_lines_mark_unsynced_rows() {
    let mut synced = Record::new("TAB-A");
    synced.synced = true;
    synced.battery_level = Some(55);
    let unsynced = Record::new("TAB-B");

    let lines = format_record_lines(&[synced.clone(), unsynced]);
    assert!(lines[0].starts_with("  "));
    assert!(lines[0].contains("TAB-A"));
    assert!(lines[0].contains("55%"));
    assert!(lines[0].contains(&short_id(&synced.id)));
    assert!(lines[1].starts_with("* "));
}

#[test]
fn list_item_flattens_record_fields() {
    let mut record = Record::new("TAB-LOW");
    record.battery_level = Some(5);
    let item = serde_json::to_value(record_to_list_item(&record)).unwrap();

    assert_eq!(item["unique_code"], "TAB-LOW");
    assert_eq!(item["low_battery"], true);
    assert_eq!(item["synced"], false);
}

#[test]
fn stats_lines_include_condition_breakdown() {
    let mut stats = RecordStats {
        total: 3,
        unsynced: 1,
        low_battery: 1,
        pending_operations: 2,
        ..RecordStats::default()
    };
    stats.by_screen_condition = BTreeMap::from([(Condition::Good, 2), (Condition::Broken, 1)]);

    let lines = format_stats_lines(&stats);
    assert_eq!(lines[0], "Records:            3");
    assert!(lines.iter().any(|line| line.contains("good=2 broken=1")));
    assert!(!lines.iter().any(|line| line.starts_with("Body")));
}

#[test]
fn sync_run_lines_show_errors() {
    let runs = vec![SyncRun {
        id: 1,
        started_at: 0,
        finished_at: 1_700_000_000_000,
        outcome: "error".to_string(),
        pulled: 0,
        pushed: 0,
        drained: 0,
        failures: 0,
        error: Some("remote unreachable".to_string()),
    }];
    let lines = format_sync_run_lines(&runs);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("2023-11-14 22:13:20 UTC"));
    assert!(lines[0].ends_with("error=remote unreachable"));
}

#[test]
fn outcome_descriptions() {
    assert_eq!(
        describe_outcome(&PassOutcome::Skipped(SkipReason::Offline)),
        "Sync skipped: offline"
    );
    assert_eq!(
        describe_outcome(&PassOutcome::Completed(SyncReport::default())),
        "Sync completed: pulled 0, pushed 0, drained 0"
    );
    assert_eq!(
        describe_outcome(&PassOutcome::Failed {
            report: SyncReport::default(),
            error: "network is down".to_string(),
        }),
        "Sync failed: network is down"
    );
}

#[test]
fn profile_building_and_rendering() {
    let profile = build_profile(" u-1 ", Some("tech@example.com".to_string()), "ADMIN").unwrap();
    assert_eq!(profile.id, "u-1");
    assert_eq!(profile.role, Role::Admin);
    assert_eq!(format_profile(&profile), "u-1  tech@example.com  admin");

    assert!(build_profile(" ", None, "viewer").is_err());
    assert!(build_profile("u-2", None, "owner").is_err());
}

#[test]
fn merge_profile_keeps_existing_fields_and_activates() {
    let mut config = CliProfilesConfig::default();
    merge_profile(
        &mut config,
        Some("field"),
        ProfileFields {
            supabase_url: Some("https://project.supabase.co/".to_string()),
            supabase_anon_key: Some("anon".to_string()),
            ..ProfileFields::default()
        },
        false,
    )
    .unwrap();
    merge_profile(
        &mut config,
        Some("field"),
        ProfileFields {
            table: Some("devices".to_string()),
            ..ProfileFields::default()
        },
        true,
    )
    .unwrap();

    let profile = config.profile("field").unwrap();
    assert_eq!(
        profile.supabase_url.as_deref(),
        Some("https://project.supabase.co")
    );
    assert_eq!(profile.supabase_anon_key.as_deref(), Some("anon"));
    assert_eq!(profile.table.as_deref(), Some("devices"));
    assert_eq!(config.active_profile.as_deref(), Some("field"));
}

#[test]
fn merge_profile_rejects_non_http_url() {
    let mut config = CliProfilesConfig::default();
    let error = merge_profile(
        &mut config,
        Some("field"),
        ProfileFields {
            supabase_url: Some("project.supabase.co".to_string()),
            ..ProfileFields::default()
        },
        true,
    )
    .unwrap_err();
    assert!(matches!(error, CliError::Config(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_record_by_id_code_and_prefix() {
    let store = LocalStore::open_in_memory().await.unwrap();
    let first = store.save_record(&Record::new("TAB-2024-0001")).await.unwrap();
    let second = store.save_record(&Record::new("TAB-2024-0002")).await.unwrap();

    let by_id = resolve_record(&first.id.to_string(), &store).await.unwrap();
    assert_eq!(by_id.id, first.id);

    let by_code = resolve_record("TAB-2024-0002", &store).await.unwrap();
    assert_eq!(by_code.id, second.id);

    let full = second.id.to_string();
    let by_prefix = resolve_record(&full[..full.len() - 2], &store).await.unwrap();
    assert_eq!(by_prefix.id, second.id);

    assert!(matches!(
        resolve_record("TAB-9999", &store).await.unwrap_err(),
        CliError::RecordNotFound(_)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_record_reports_ambiguous_prefix() {
    let store = LocalStore::open_in_memory().await.unwrap();
    let first = store.save_record(&Record::new("TAB-A")).await.unwrap();
    let second = store.save_record(&Record::new("TAB-B")).await.unwrap();

    let first_id = first.id.to_string();
    let second_id = second.id.to_string();
    let shared = first_id
        .chars()
        .zip(second_id.chars())
        .take_while(|(left, right)| left == right)
        .map(|(left, _)| left)
        .collect::<String>();
    if shared.is_empty() {
        return;
    }

    let error = resolve_record(&shared, &store).await.unwrap_err();
    let CliError::AmbiguousRecordId(message) = error else {
        panic!("expected ambiguity error");
    };
    assert!(message.contains(&short_id(&first.id)));
}

#[tokio::test(flavor = "multi_thread")]
async fn local_only_mutations_queue_operations() {
    let db_path = unique_test_db_path();
    let store = LocalStore::open_path(&db_path).await.unwrap();
    let reconciler = detached_reconciler(store.clone());

    let record = build_record(&form("TAB-2024-0001")).unwrap();
    let receipt = reconciler
        .record_local_mutation(LocalMutation::Insert(record))
        .await
        .unwrap();
    assert!(receipt.sync.is_none());
    let stored = receipt.record.clone().unwrap();
    assert_eq!(settle_mutation(receipt).await, None);

    let mut edited = stored.clone();
    apply_form(
        &mut edited,
        &RecordForm {
            battery: Some(15),
            ..RecordForm::default()
        },
    )
    .unwrap();
    reconciler
        .record_local_mutation(LocalMutation::Update(edited))
        .await
        .unwrap();
    reconciler
        .record_local_mutation(LocalMutation::Delete(stored.id))
        .await
        .unwrap();

    let reopened = LocalStore::open_path(&db_path).await.unwrap();
    let kinds = reopened
        .unsynced_operations()
        .await
        .unwrap()
        .into_iter()
        .map(|operation| operation.kind)
        .collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            OperationKind::Insert,
            OperationKind::Update,
            OperationKind::Delete
        ]
    );
    assert!(reopened.get_record(&stored.id).await.unwrap().is_none());

    let lines = format_operation_lines(&reopened.pending_operations().await.unwrap());
    assert!(lines[0].contains("INSERT"));
    assert!(lines[0].contains("code=TAB-2024-0001"));
    assert!(lines[2].contains("code=-"));

    drop(reopened);
    drop(store);
    let _ = std::fs::remove_file(db_path);
}

#[tokio::test(flavor = "multi_thread")]
async fn detached_sync_is_skipped_offline() {
    let store = LocalStore::open_in_memory().await.unwrap();
    let reconciler = detached_reconciler(store);

    let outcome = reconciler.trigger_sync(true).await;
    assert!(matches!(outcome, PassOutcome::Skipped(SkipReason::Offline)));
}
