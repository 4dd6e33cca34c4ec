use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use taskbridge_core::db::Database;
use taskbridge_core::models::{FieldMapping, SyncConflict};
use taskbridge_core::sync::FieldFailure;
use taskbridge_core::{FieldValue, Task, TaskField, TaskId};

use crate::error::CliError;

const DEFAULT_USER: &str = "local";

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("TASKBRIDGE_DB_PATH").map(PathBuf::from))
    {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("taskbridge").join("taskbridge.db"))
        .ok_or(CliError::DataDirUnavailable)
}

pub fn resolve_user(cli_user: Option<String>) -> String {
    cli_user
        .or_else(|| env::var("TASKBRIDGE_USER").ok())
        .and_then(|user| normalize_identifier(&user))
        .unwrap_or_else(|| DEFAULT_USER.to_string())
}

pub async fn open_database(path: &Path) -> Result<Database, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(path).await?)
}

pub fn normalize_identifier(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn parse_task_id(id: &str) -> Result<TaskId, CliError> {
    id.trim()
        .parse::<TaskId>()
        .map_err(|_| CliError::TaskNotFound(id.to_string()))
}

/// Parse repeated `field=property` arguments into a mapping table
pub fn parse_field_specs(specs: &[String]) -> Result<BTreeMap<TaskField, String>, CliError> {
    let mut fields = BTreeMap::new();
    for spec in specs {
        let Some((field, property)) = spec.split_once('=') else {
            return Err(CliError::InvalidFieldSpec(spec.clone()));
        };
        let field = field
            .parse::<TaskField>()
            .map_err(|_| CliError::InvalidFieldSpec(spec.clone()))?;
        let Some(property) = normalize_identifier(property) else {
            return Err(CliError::InvalidFieldSpec(spec.clone()));
        };
        fields.insert(field, property);
    }
    Ok(fields)
}

/// Raw command-line text as a field value; blank input clears the field
pub fn field_value_from_arg(value: &str) -> FieldValue {
    if value.trim().is_empty() {
        FieldValue::Empty
    } else {
        FieldValue::Text(value.to_string())
    }
}

pub fn format_task_lines(tasks: &[Task]) -> Vec<String> {
    tasks
        .iter()
        .map(|task| {
            let id = task.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let title = truncate(&task.title, 40);
            let link = task.remote_page_id.as_deref().unwrap_or("-");
            let synced = task
                .last_synced_at
                .map_or_else(|| "never".to_string(), format_timestamp);
            format!(
                "{short_id:<13}  {title:<40}  {:<12}  {link:<16}  {synced}",
                task.status
            )
        })
        .collect()
}

pub fn format_mapping_lines(mapping: &FieldMapping) -> Vec<String> {
    let mut lines = vec![format!(
        "{}  strategy={}{}",
        mapping.database_id,
        mapping.config.default_strategy,
        mapping
            .config
            .label
            .as_deref()
            .map(|label| format!("  label={label}"))
            .unwrap_or_default()
    )];
    lines.extend(
        mapping
            .iter()
            .map(|(field, property)| format!("  {:<12} -> {property}", field.as_str())),
    );
    lines
}

pub fn format_conflict_line(conflict: &SyncConflict) -> String {
    format!(
        "conflict  task={}  field={}  local={}  remote={}",
        conflict.task_id, conflict.field, conflict.local_value, conflict.remote_value
    )
}

pub fn format_failure_line(failure: &FieldFailure) -> String {
    let field = failure.field.map_or("-", TaskField::as_str);
    format!(
        "failed    task={}  field={field}  stage={:?}  {}",
        failure.task_id, failure.stage, failure.error
    )
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut truncated = value.chars().take(max_chars.saturating_sub(3)).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
