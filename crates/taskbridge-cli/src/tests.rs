use std::path::Path;

use pretty_assertions::assert_eq;
use taskbridge_core::db::{Database, LibSqlTaskRepository, TaskStore};
use taskbridge_core::models::RemoteRecord;
use taskbridge_core::{CycleOutcome, FieldValue, ResolutionStrategy, SyncState, TaskField};
use tempfile::TempDir;

use crate::cli::CompletionShell;
use crate::commands::common::{
    field_value_from_arg, format_timestamp, parse_field_specs, parse_task_id, resolve_user,
};
use crate::commands::completions::render_completions;
use crate::commands::mapping::{run_mapping_delete, save_mapping};
use crate::commands::sync::{format_report_lines, run_sync, sync_database};
use crate::error::CliError;

#[test]
fn parse_field_specs_builds_mapping_table() {
    let fields = parse_field_specs(&[
        "title=Name".to_string(),
        "due-date= Due ".to_string(),
    ])
    .unwrap();

    assert_eq!(fields.get(&TaskField::Title).map(String::as_str), Some("Name"));
    assert_eq!(fields.get(&TaskField::DueDate).map(String::as_str), Some("Due"));
}

#[test]
fn parse_field_specs_rejects_malformed_entries() {
    assert!(matches!(
        parse_field_specs(&["title".to_string()]),
        Err(CliError::InvalidFieldSpec(_))
    ));
    assert!(matches!(
        parse_field_specs(&["owner=Owner".to_string()]),
        Err(CliError::InvalidFieldSpec(_))
    ));
    assert!(matches!(
        parse_field_specs(&["title= ".to_string()]),
        Err(CliError::InvalidFieldSpec(_))
    ));
}

#[test]
fn blank_argument_clears_field() {
    assert_eq!(field_value_from_arg("  "), FieldValue::Empty);
    assert_eq!(
        field_value_from_arg("3.5"),
        FieldValue::Text("3.5".to_string())
    );
}

#[test]
fn explicit_user_wins_and_is_trimmed() {
    assert_eq!(resolve_user(Some("  alice ".to_string())), "alice");
}

#[test]
fn task_id_must_be_a_uuid() {
    assert!(matches!(
        parse_task_id("not-a-task"),
        Err(CliError::TaskNotFound(_))
    ));
}

#[test]
fn format_timestamp_renders_utc() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn completions_name_the_binary() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("taskbridge"));
}

async fn write_page(dir: &Path, record: &RemoteRecord) {
    let path = dir.join(format!("{}.json", record.id));
    tokio::fs::write(path, serde_json::to_string_pretty(record).unwrap())
        .await
        .unwrap();
}

async fn linked_task(db_path: &Path, title: &str) -> taskbridge_core::TaskId {
    let db = Database::open(db_path).await.unwrap();
    let repo = LibSqlTaskRepository::new(db.connection());
    let task = repo.create("user-1", title).await.unwrap();
    repo.link("user-1", &task.id, "page-1", "db-1").await.unwrap();
    task.id
}

#[tokio::test(flavor = "multi_thread")]
async fn mapping_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("taskbridge.db");

    let saved = save_mapping(
        "user-1",
        "db-1",
        &["title=Name".to_string(), "status=Stage".to_string()],
        Some("latest-wins"),
        Some(" Roadmap "),
        &db_path,
    )
    .await
    .unwrap();

    assert_eq!(saved.config.default_strategy, ResolutionStrategy::LatestWins);
    assert_eq!(saved.config.label.as_deref(), Some("Roadmap"));
    assert_eq!(saved.property_for(TaskField::Status), Some("Stage"));

    run_mapping_delete("user-1", "db-1", &db_path).await.unwrap();
    assert!(matches!(
        run_mapping_delete("user-1", "db-1", &db_path).await,
        Err(CliError::MappingNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn mapping_rejects_unknown_strategy() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("taskbridge.db");

    let result = save_mapping(
        "user-1",
        "db-1",
        &["title=Name".to_string()],
        Some("coin-flip"),
        None,
        &db_path,
    )
    .await;
    assert!(matches!(result, Err(CliError::Core(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_adopts_remote_directory_pages() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("taskbridge.db");
    let remote_dir = dir.path().join("remote");
    std::fs::create_dir_all(&remote_dir).unwrap();

    let task_id = linked_task(&db_path, "Local title").await;
    save_mapping(
        "user-1",
        "db-1",
        &["title=Name".to_string(), "completed=Done".to_string()],
        Some("remote-wins"),
        None,
        &db_path,
    )
    .await
    .unwrap();
    write_page(
        &remote_dir,
        &RemoteRecord::new("page-1", 1_000)
            .with_property("Name", FieldValue::Text("Remote title".to_string()))
            .with_property("Done", FieldValue::Checkbox(true)),
    )
    .await;

    let report = sync_database("user-1", "db-1", &remote_dir, None, &db_path)
        .await
        .unwrap();
    assert_eq!(report.outcome, CycleOutcome::Applied);
    assert_eq!(report.applied_count, 2);
    assert_eq!(report.status.state, SyncState::Idle);
    assert!(format_report_lines(&report)[0].contains("applied=2"));

    let db = Database::open(&db_path).await.unwrap();
    let task = LibSqlTaskRepository::new(db.connection())
        .get_task("user-1", &task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.title, "Remote title");
    assert!(task.completed);
    assert!(task.last_synced_at.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_fails_when_page_is_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("taskbridge.db");
    let remote_dir = dir.path().join("remote");
    std::fs::create_dir_all(&remote_dir).unwrap();

    linked_task(&db_path, "Orphan").await;
    save_mapping(
        "user-1",
        "db-1",
        &["title=Name".to_string()],
        Some("remote-wins"),
        None,
        &db_path,
    )
    .await
    .unwrap();

    let result = run_sync("user-1", "db-1", &remote_dir, None, false, &db_path).await;
    assert!(matches!(result, Err(CliError::SyncIncomplete(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_without_mapping_is_rejected() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("taskbridge.db");

    let result = sync_database("user-1", "db-1", dir.path(), None, &db_path).await;
    assert!(matches!(
        result,
        Err(CliError::Sync(taskbridge_core::SyncError::MappingNotFound { .. }))
    ));
}
