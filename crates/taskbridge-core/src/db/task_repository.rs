//! Task repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use chrono::NaiveDate;
use libsql::{params, Connection, Value};

use super::row::{optional_integer, optional_real, optional_text, text_or_null};
use crate::error::{Error, Result};
use crate::models::{FieldValue, Task, TaskField, TaskId};

const TASK_COLUMNS: &str = "id, user_id, title, description, status, priority, estimate, \
     due_date, completed, remote_page_id, remote_database_id, created_at, updated_at, \
     last_synced_at";

/// Local task store as seen by the sync engine.
///
/// Every operation is scoped to the owning user.
#[allow(async_fn_in_trait)]
pub trait TaskStore {
    /// Get a task by ID
    async fn get_task(&self, user_id: &str, id: &TaskId) -> Result<Option<Task>>;

    /// Tasks linked to a page of `database_id`, ordered by ID
    async fn list_linked_tasks(&self, user_id: &str, database_id: &str) -> Result<Vec<Task>>;

    /// Write a synced value and stamp `last_synced_at`.
    ///
    /// Does not touch `updated_at`: sync writes are not user edits.
    async fn write_field(
        &self,
        user_id: &str,
        id: &TaskId,
        field: TaskField,
        value: &FieldValue,
        synced_at: i64,
    ) -> Result<()>;

    /// Stamp `last_synced_at` without changing any field
    async fn mark_synced(&self, user_id: &str, id: &TaskId, synced_at: i64) -> Result<()>;
}

/// libSQL implementation of `TaskStore`
pub struct LibSqlTaskRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlTaskRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new unlinked task
    pub async fn create(&self, user_id: &str, title: &str) -> Result<Task> {
        let task = Task::new(user_id, title);
        self.create_with_task(&task).await?;
        Ok(task)
    }

    /// Insert a fully specified task
    pub async fn create_with_task(&self, task: &Task) -> Result<()> {
        let sql = format!(
            "INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        self.conn
            .execute(
                &sql,
                params![
                    task.id.as_str(),
                    task.user_id.as_str(),
                    task.title.as_str(),
                    text_or_null(task.description.as_deref()),
                    task.status.as_str(),
                    text_or_null(task.priority.as_deref()),
                    task.estimate.map_or(Value::Null, Value::Real),
                    task.due_date
                        .map_or(Value::Null, |date| Value::Text(format_date(date))),
                    i64::from(task.completed),
                    text_or_null(task.remote_page_id.as_deref()),
                    text_or_null(task.remote_database_id.as_deref()),
                    task.created_at,
                    task.updated_at,
                    task.last_synced_at.map_or(Value::Null, Value::Integer)
                ],
            )
            .await?;
        Ok(())
    }

    /// List a user's tasks, most recently edited first
    pub async fn list(&self, user_id: &str, limit: usize, offset: usize) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?
             ORDER BY updated_at DESC LIMIT ? OFFSET ?"
        );
        let mut rows = self
            .conn
            .query(&sql, params![user_id, limit as i64, offset as i64])
            .await?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(parse_task(&row)?);
        }
        Ok(tasks)
    }

    /// Link a task to a remote page. Resets the sync baseline so the first
    /// cycle adopts the remote values.
    pub async fn link(
        &self,
        user_id: &str,
        id: &TaskId,
        remote_page_id: &str,
        remote_database_id: &str,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE tasks
                 SET remote_page_id = ?, remote_database_id = ?, last_synced_at = NULL
                 WHERE id = ? AND user_id = ?",
                params![remote_page_id, remote_database_id, id.as_str(), user_id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Apply a user edit to one field, bumping `updated_at`
    pub async fn update_field(
        &self,
        user_id: &str,
        id: &TaskId,
        field: TaskField,
        value: &FieldValue,
    ) -> Result<Task> {
        let now = chrono::Utc::now().timestamp_millis();
        let sql = format!(
            "UPDATE tasks SET {} = ?, updated_at = ? WHERE id = ? AND user_id = ?",
            field.column()
        );
        let rows = self
            .conn
            .execute(
                &sql,
                params![column_value(field, value)?, now, id.as_str(), user_id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.get_task(user_id, id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

impl TaskStore for LibSqlTaskRepository<'_> {
    async fn get_task(&self, user_id: &str, id: &TaskId) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND user_id = ?");
        let mut rows = self.conn.query(&sql, params![id.as_str(), user_id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_task(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_linked_tasks(&self, user_id: &str, database_id: &str) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ? AND remote_database_id = ? AND remote_page_id IS NOT NULL
             ORDER BY id ASC"
        );
        let mut rows = self.conn.query(&sql, params![user_id, database_id]).await?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(parse_task(&row)?);
        }
        Ok(tasks)
    }

    async fn write_field(
        &self,
        user_id: &str,
        id: &TaskId,
        field: TaskField,
        value: &FieldValue,
        synced_at: i64,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE tasks SET {} = ?, last_synced_at = ? WHERE id = ? AND user_id = ?",
            field.column()
        );
        let rows = self
            .conn
            .execute(
                &sql,
                params![column_value(field, value)?, synced_at, id.as_str(), user_id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn mark_synced(&self, user_id: &str, id: &TaskId, synced_at: i64) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE tasks SET last_synced_at = ? WHERE id = ? AND user_id = ?",
                params![synced_at, id.as_str(), user_id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Convert a field value into the column representation for `field`
fn column_value(field: TaskField, value: &FieldValue) -> Result<Value> {
    let coerced = value.coerce(field.kind()).ok_or_else(|| {
        Error::InvalidInput(format!("Cannot store {value} in field '{field}'"))
    })?;

    Ok(match coerced {
        FieldValue::Empty => match field {
            // NOT NULL columns
            TaskField::Title | TaskField::Status => Value::Text(String::new()),
            TaskField::Completed => Value::Integer(0),
            _ => Value::Null,
        },
        FieldValue::Text(text) | FieldValue::Select(text) => Value::Text(text),
        FieldValue::Number(number) => Value::Real(number),
        FieldValue::Date(date) => Value::Text(format_date(date)),
        FieldValue::Checkbox(checked) => Value::Integer(i64::from(checked)),
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a task from a database row
fn parse_task(row: &libsql::Row) -> Result<Task> {
    let id: String = row.get(0)?;
    let id = id
        .parse()
        .map_err(|_| Error::Database(format!("Invalid task ID: {id}")))?;

    let due_date = optional_text(row, 7)?
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|_| Error::Database(format!("Invalid due date: {raw}")))
        })
        .transpose()?;

    Ok(Task {
        id,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: optional_text(row, 3)?,
        status: row.get(4)?,
        priority: optional_text(row, 5)?,
        estimate: optional_real(row, 6)?,
        due_date,
        completed: row.get::<i64>(8)? != 0,
        remote_page_id: optional_text(row, 9)?,
        remote_database_id: optional_text(row, 10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        last_synced_at: optional_integer(row, 13)?,
    })
}
