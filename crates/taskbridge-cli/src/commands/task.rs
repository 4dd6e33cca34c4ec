use std::path::Path;

use serde::Serialize;
use taskbridge_core::db::{LibSqlTaskRepository, TaskStore};
use taskbridge_core::{Task, TaskField};

use crate::commands::common::{
    field_value_from_arg, format_task_lines, normalize_identifier, open_database, parse_task_id,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct TaskListItem {
    pub id: String,
    pub title: String,
    pub status: String,
    pub remote_page_id: Option<String>,
    pub remote_database_id: Option<String>,
    pub updated_at: i64,
    pub last_synced_at: Option<i64>,
}

impl From<&Task> for TaskListItem {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.to_string(),
            title: task.title.clone(),
            status: task.status.clone(),
            remote_page_id: task.remote_page_id.clone(),
            remote_database_id: task.remote_database_id.clone(),
            updated_at: task.updated_at,
            last_synced_at: task.last_synced_at,
        }
    }
}

pub async fn run_task_add(
    user: &str,
    title_parts: &[String],
    db_path: &Path,
) -> Result<(), CliError> {
    let title =
        normalize_identifier(&title_parts.join(" ")).ok_or(CliError::EmptyValue("Task title"))?;

    let db = open_database(db_path).await?;
    let task = LibSqlTaskRepository::new(db.connection())
        .create(user, &title)
        .await?;

    println!("{}", task.id);
    Ok(())
}

pub async fn list_tasks(user: &str, limit: usize, db_path: &Path) -> Result<Vec<Task>, CliError> {
    let db = open_database(db_path).await?;
    Ok(LibSqlTaskRepository::new(db.connection())
        .list(user, limit, 0)
        .await?)
}

pub async fn run_task_list(
    user: &str,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let tasks = list_tasks(user, limit, db_path).await?;

    if as_json {
        let items = tasks.iter().map(TaskListItem::from).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if tasks.is_empty() {
        println!("No tasks yet.");
    } else {
        for line in format_task_lines(&tasks) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_task_link(
    user: &str,
    id: &str,
    page: &str,
    database: &str,
    db_path: &Path,
) -> Result<(), CliError> {
    let task_id = parse_task_id(id)?;
    let page = normalize_identifier(page).ok_or(CliError::EmptyValue("Page id"))?;
    let database = normalize_identifier(database).ok_or(CliError::EmptyValue("Database id"))?;

    let db = open_database(db_path).await?;
    let repo = LibSqlTaskRepository::new(db.connection());
    repo.link(user, &task_id, &page, &database)
        .await
        .map_err(|error| match error {
            taskbridge_core::Error::NotFound(_) => CliError::TaskNotFound(id.to_string()),
            other => other.into(),
        })?;

    println!("{task_id} -> {page}");
    Ok(())
}

pub async fn run_task_set(
    user: &str,
    id: &str,
    field: &str,
    value: &str,
    db_path: &Path,
) -> Result<(), CliError> {
    let task_id = parse_task_id(id)?;
    let field = field.parse::<TaskField>()?;

    let db = open_database(db_path).await?;
    let repo = LibSqlTaskRepository::new(db.connection());
    if repo.get_task(user, &task_id).await?.is_none() {
        return Err(CliError::TaskNotFound(id.to_string()));
    }

    let task = repo
        .update_field(user, &task_id, field, &field_value_from_arg(value))
        .await?;
    println!("{}  {field} = {}", task.id, task.field_value(field));
    Ok(())
}
