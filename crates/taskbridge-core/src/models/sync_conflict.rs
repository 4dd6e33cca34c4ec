//! Sync conflict and resolution value objects

use serde::{Deserialize, Serialize};

use super::strategy::ResolutionStrategy;
use super::task::{TaskField, TaskId};
use super::value::FieldValue;

/// A field whose local and remote values diverged since the last sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub task_id: TaskId,
    pub remote_id: String,
    pub field: TaskField,
    pub local_value: FieldValue,
    pub remote_value: FieldValue,
    /// Local task's `updated_at` (Unix ms)
    pub local_updated_at: i64,
    /// Remote page's `last_edited_time` (Unix ms)
    pub remote_updated_at: i64,
}

/// Side a resolved value was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Local,
    Remote,
}

/// Outcome of resolving one conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolved {
    /// A value to write to both stores
    Value {
        value: FieldValue,
        source: ResolutionSource,
    },
    /// Awaiting a human decision; never applied
    Pending {
        local: FieldValue,
        remote: FieldValue,
    },
}

/// Resolution of a single conflict under a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub task_id: TaskId,
    pub remote_id: String,
    pub field: TaskField,
    pub resolved: Resolved,
    pub strategy: ResolutionStrategy,
}

impl ConflictResolution {
    pub const fn is_manual(&self) -> bool {
        matches!(self.resolved, Resolved::Pending { .. })
    }

    /// Rebuild the conflict a pending resolution was produced from
    pub fn as_pending_conflict(
        &self,
        local_updated_at: i64,
        remote_updated_at: i64,
    ) -> Option<SyncConflict> {
        match &self.resolved {
            Resolved::Pending { local, remote } => Some(SyncConflict {
                task_id: self.task_id,
                remote_id: self.remote_id.clone(),
                field: self.field,
                local_value: local.clone(),
                remote_value: remote.clone(),
                local_updated_at,
                remote_updated_at,
            }),
            Resolved::Value { .. } => None,
        }
    }
}
