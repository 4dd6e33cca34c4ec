//! Task model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::value::{FieldKind, FieldValue};
use crate::error::Error;

/// A unique identifier for a task, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Local task fields that the sync engine knows how to read and write.
///
/// Declaration order is the order in which a cycle applies resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskField {
    Title,
    Description,
    Status,
    Priority,
    Estimate,
    DueDate,
    Completed,
}

impl TaskField {
    pub const ALL: [Self; 7] = [
        Self::Title,
        Self::Description,
        Self::Status,
        Self::Priority,
        Self::Estimate,
        Self::DueDate,
        Self::Completed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Status => "status",
            Self::Priority => "priority",
            Self::Estimate => "estimate",
            Self::DueDate => "due_date",
            Self::Completed => "completed",
        }
    }

    /// Value kind used for comparison and coercion
    pub const fn kind(self) -> FieldKind {
        match self {
            Self::Title | Self::Description => FieldKind::Text,
            Self::Status | Self::Priority => FieldKind::Select,
            Self::Estimate => FieldKind::Number,
            Self::DueDate => FieldKind::Date,
            Self::Completed => FieldKind::Checkbox,
        }
    }

    /// Column backing this field in the `tasks` table
    pub const fn column(self) -> &'static str {
        // Column names match the serialized field names.
        self.as_str()
    }
}

impl fmt::Display for TaskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown task field: {s}")))
    }
}

/// A task in the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,
    /// Owning user
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: Option<String>,
    /// Estimated effort in hours
    pub estimate: Option<f64>,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    /// Linked remote page, if any
    pub remote_page_id: Option<String>,
    /// Remote database the linked page lives in
    pub remote_database_id: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last user edit timestamp (Unix ms)
    pub updated_at: i64,
    /// Last successful sync (Unix ms); `None` means never synchronized
    pub last_synced_at: Option<i64>,
}

impl Task {
    /// Create a new unlinked task for `user_id`
    #[must_use]
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: TaskId::new(),
            user_id: user_id.into(),
            title: title.into(),
            description: None,
            status: "todo".to_string(),
            priority: None,
            estimate: None,
            due_date: None,
            completed: false,
            remote_page_id: None,
            remote_database_id: None,
            created_at: now,
            updated_at: now,
            last_synced_at: None,
        }
    }

    /// Current value of `field` as a typed field value
    pub fn field_value(&self, field: TaskField) -> FieldValue {
        match field {
            TaskField::Title => FieldValue::Text(self.title.clone()),
            TaskField::Description => self
                .description
                .clone()
                .map_or(FieldValue::Empty, FieldValue::Text),
            TaskField::Status => FieldValue::Select(self.status.clone()),
            TaskField::Priority => self
                .priority
                .clone()
                .map_or(FieldValue::Empty, FieldValue::Select),
            TaskField::Estimate => self.estimate.map_or(FieldValue::Empty, FieldValue::Number),
            TaskField::DueDate => self.due_date.map_or(FieldValue::Empty, FieldValue::Date),
            TaskField::Completed => FieldValue::Checkbox(self.completed),
        }
    }

    /// Whether this task has been synchronized at least once
    pub const fn has_sync_baseline(&self) -> bool {
        self.last_synced_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_parse() {
        let id = TaskId::new();
        let parsed: TaskId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_task_new_has_no_baseline() {
        let task = Task::new("user-1", "Write report");
        assert_eq!(task.title, "Write report");
        assert_eq!(task.status, "todo");
        assert!(!task.has_sync_baseline());
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn test_task_field_parse_accepts_dashes_and_case() {
        assert_eq!("Due-Date".parse::<TaskField>().unwrap(), TaskField::DueDate);
        assert_eq!(" title ".parse::<TaskField>().unwrap(), TaskField::Title);
        assert!("assignee".parse::<TaskField>().is_err());
    }

    #[test]
    fn test_field_value_reads_optional_fields_as_empty() {
        let task = Task::new("user-1", "Draft");
        assert_eq!(task.field_value(TaskField::Description), FieldValue::Empty);
        assert_eq!(task.field_value(TaskField::Estimate), FieldValue::Empty);
        assert_eq!(
            task.field_value(TaskField::Completed),
            FieldValue::Checkbox(false)
        );
    }

    #[test]
    fn test_field_order_follows_declaration() {
        let mut fields = vec![TaskField::Completed, TaskField::Title, TaskField::Status];
        fields.sort();
        assert_eq!(
            fields,
            vec![TaskField::Title, TaskField::Status, TaskField::Completed]
        );
    }
}
