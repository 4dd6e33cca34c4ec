//! Two-phase commit of resolved values, field by field
//!
//! The local store and the remote workspace share no transaction, so each
//! resolution is written local-first and then remote. A failure on either
//! side is recorded against that field and the batch moves on; the next
//! cycle re-detects whatever is still divergent.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::db::TaskStore;
use crate::gate::RateGate;
use crate::models::{
    ConflictResolution, FieldMapping, FieldValue, ResolutionSource, Resolved, TaskField, TaskId,
};
use crate::remote::RemoteClient;
use crate::util::{compact_text, unix_millis_now};

/// Where a field failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStage {
    /// Reading the remote page (no field involved)
    Fetch,
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldFailure {
    pub task_id: TaskId,
    pub remote_id: String,
    /// `None` for page-level failures
    pub field: Option<TaskField>,
    pub stage: ApplyStage,
    pub error: String,
}

/// Result of applying one batch of resolutions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    /// Resolutions committed to both stores
    pub applied: Vec<ConflictResolution>,
    /// Manual resolutions, returned untouched
    pub manual: Vec<ConflictResolution>,
    pub failures: Vec<FieldFailure>,
}

impl ApplyReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("{} field write(s) failed, {} applied", .0.failures.len(), .0.applied.len())]
    PartialFailure(ApplyReport),
    #[error("Apply cancelled after {} field(s)", .0.applied.len())]
    Cancelled(ApplyReport),
}

impl ApplyError {
    pub const fn report(&self) -> &ApplyReport {
        match self {
            Self::PartialFailure(report) | Self::Cancelled(report) => report,
        }
    }

    pub fn into_report(self) -> ApplyReport {
        match self {
            Self::PartialFailure(report) | Self::Cancelled(report) => report,
        }
    }
}

/// Commits resolutions for pages of one mapped database
pub struct ResolutionApplier<'a, T, R> {
    store: &'a T,
    remote: &'a R,
    gate: &'a RateGate,
    mapping: &'a FieldMapping,
}

impl<'a, T: TaskStore, R: RemoteClient> ResolutionApplier<'a, T, R> {
    pub const fn new(
        store: &'a T,
        remote: &'a R,
        gate: &'a RateGate,
        mapping: &'a FieldMapping,
    ) -> Self {
        Self {
            store,
            remote,
            gate,
            mapping,
        }
    }

    /// Apply `resolutions` in order.
    ///
    /// Each value is written locally first, stamping `last_synced_at`, then
    /// pushed remotely when it came from the local side. A local write that
    /// would not change the stored value is skipped along with its stamp, so
    /// re-applying a batch leaves the task untouched and a later remote
    /// failure keeps the previous baseline. The engine stamps the baseline
    /// once a task's whole batch succeeded.
    ///
    /// Manual resolutions are never written. Cancellation is observed
    /// between resolutions only, so a field is never left half-written.
    pub async fn apply(
        &self,
        user_id: &str,
        resolutions: &[ConflictResolution],
        cancel: &CancellationToken,
    ) -> Result<ApplyReport, ApplyError> {
        let mut report = ApplyReport::default();
        let mut pending = Vec::new();

        for resolution in resolutions {
            match &resolution.resolved {
                Resolved::Value { value, source } => pending.push((resolution, value, *source)),
                Resolved::Pending { .. } => report.manual.push(resolution.clone()),
            }
        }

        for (resolution, value, source) in pending {
            if cancel.is_cancelled() {
                tracing::info!(
                    user = user_id,
                    applied = report.applied.len(),
                    "Apply cancelled"
                );
                return Err(ApplyError::Cancelled(report));
            }

            if let Err(error) = self.apply_local(user_id, resolution, value).await {
                tracing::warn!(
                    user = user_id,
                    task = %resolution.task_id,
                    field = %resolution.field,
                    error = %error,
                    "Local field write failed"
                );
                report
                    .failures
                    .push(failure(resolution, ApplyStage::Local, &error.to_string()));
                continue;
            }

            if source == ResolutionSource::Local {
                if let Err(error) = self.apply_remote(resolution, value).await {
                    tracing::warn!(
                        user = user_id,
                        task = %resolution.task_id,
                        field = %resolution.field,
                        error = %error,
                        "Remote field write failed, local store is ahead"
                    );
                    report
                        .failures
                        .push(failure(resolution, ApplyStage::Remote, &error));
                    continue;
                }
            }

            tracing::debug!(
                user = user_id,
                task = %resolution.task_id,
                field = %resolution.field,
                source = ?source,
                "Applied resolution"
            );
            report.applied.push(resolution.clone());
        }

        if report.failures.is_empty() {
            Ok(report)
        } else {
            Err(ApplyError::PartialFailure(report))
        }
    }

    /// Write `value` locally unless the task already holds an equivalent value
    async fn apply_local(
        &self,
        user_id: &str,
        resolution: &ConflictResolution,
        value: &FieldValue,
    ) -> crate::Result<()> {
        let task = self
            .store
            .get_task(user_id, &resolution.task_id)
            .await?
            .ok_or_else(|| crate::Error::NotFound(resolution.task_id.to_string()))?;

        let field = resolution.field;
        if task.field_value(field).equivalent(value, field.kind()) {
            return Ok(());
        }
        self.store
            .write_field(user_id, &resolution.task_id, field, value, unix_millis_now())
            .await
    }

    async fn apply_remote(
        &self,
        resolution: &ConflictResolution,
        value: &FieldValue,
    ) -> Result<(), String> {
        let property = self
            .mapping
            .property_for(resolution.field)
            .ok_or_else(|| format!("Field '{}' is not mapped", resolution.field))?;
        let properties = BTreeMap::from([(property.to_string(), value.clone())]);

        self.gate
            .call("write_properties", || {
                self.remote
                    .write_properties(&resolution.remote_id, &properties)
            })
            .await
            .map_err(|error| error.to_string())
    }
}

fn failure(resolution: &ConflictResolution, stage: ApplyStage, error: &str) -> FieldFailure {
    FieldFailure {
        task_id: resolution.task_id,
        remote_id: resolution.remote_id.clone(),
        field: Some(resolution.field),
        stage,
        error: compact_text(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, LibSqlTaskRepository};
    use crate::gate::GateConfig;
    use crate::models::{RemoteRecord, ResolutionStrategy, Task};
    use crate::remote::MemoryRemote;
    use pretty_assertions::assert_eq;

    struct Fixture {
        db: Database,
        remote: MemoryRemote,
        gate: RateGate,
        mapping: FieldMapping,
        task: Task,
    }

    async fn fixture() -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        let mut task = Task::new("user-1", "Draft");
        task.remote_page_id = Some("page-1".to_string());
        task.remote_database_id = Some("db-1".to_string());
        task.last_synced_at = Some(1_000);
        LibSqlTaskRepository::new(db.connection())
            .create_with_task(&task)
            .await
            .unwrap();

        let remote = MemoryRemote::new();
        remote
            .insert_page(
                RemoteRecord::new("page-1", 500)
                    .with_property("Name", FieldValue::Text("Final".to_string()))
                    .with_property("Stage", FieldValue::Select("todo".to_string())),
            )
            .await;

        let mapping = FieldMapping::new(
            "user-1",
            "db-1",
            BTreeMap::from([
                (TaskField::Title, "Name".to_string()),
                (TaskField::Status, "Stage".to_string()),
            ]),
        );

        Fixture {
            db,
            remote,
            gate: RateGate::new(GateConfig::test()),
            mapping,
            task,
        }
    }

    fn resolution(
        task: &Task,
        field: TaskField,
        value: FieldValue,
        source: ResolutionSource,
    ) -> ConflictResolution {
        ConflictResolution {
            task_id: task.id,
            remote_id: "page-1".to_string(),
            field,
            resolved: Resolved::Value { value, source },
            strategy: ResolutionStrategy::LatestWins,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_sourced_value_is_written_locally_only() {
        let fx = fixture().await;
        let store = LibSqlTaskRepository::new(fx.db.connection());
        let applier = ResolutionApplier::new(&store, &fx.remote, &fx.gate, &fx.mapping);

        let batch = [resolution(
            &fx.task,
            TaskField::Title,
            FieldValue::Text("Final".to_string()),
            ResolutionSource::Remote,
        )];
        let report = applier
            .apply("user-1", &batch, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.applied_count(), 1);
        let task = store.get_task("user-1", &fx.task.id).await.unwrap().unwrap();
        assert_eq!(task.title, "Final");
        assert!(task.last_synced_at.unwrap() > 1_000);
        assert_eq!(fx.remote.write_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_failure_skips_remote_and_continues() {
        let fx = fixture().await;
        let store = LibSqlTaskRepository::new(fx.db.connection());
        let applier = ResolutionApplier::new(&store, &fx.remote, &fx.gate, &fx.mapping);

        let mut orphan = fx.task.clone();
        orphan.id = TaskId::new();
        let batch = [
            resolution(
                &orphan,
                TaskField::Title,
                FieldValue::Text("Lost".to_string()),
                ResolutionSource::Local,
            ),
            resolution(
                &fx.task,
                TaskField::Status,
                FieldValue::Select("done".to_string()),
                ResolutionSource::Remote,
            ),
        ];

        let err = applier
            .apply("user-1", &batch, &CancellationToken::new())
            .await
            .unwrap_err();
        let ApplyError::PartialFailure(report) = err else {
            panic!("expected partial failure");
        };

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stage, ApplyStage::Local);
        assert_eq!(report.failures[0].field, Some(TaskField::Title));
        assert_eq!(report.applied_count(), 1);
        assert_eq!(fx.remote.write_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unchanged_local_value_keeps_baseline_when_remote_write_fails() {
        let fx = fixture().await;
        fx.remote.reject_writes_to("Name").await;
        let store = LibSqlTaskRepository::new(fx.db.connection());
        let applier = ResolutionApplier::new(&store, &fx.remote, &fx.gate, &fx.mapping);

        let batch = [resolution(
            &fx.task,
            TaskField::Title,
            FieldValue::Text("Draft".to_string()),
            ResolutionSource::Local,
        )];
        let err = applier
            .apply("user-1", &batch, &CancellationToken::new())
            .await
            .unwrap_err();

        let report = err.into_report();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stage, ApplyStage::Remote);
        assert_eq!(report.applied_count(), 0);
        let task = store.get_task("user-1", &fx.task.id).await.unwrap().unwrap();
        assert_eq!(task, fx.task);
        assert_eq!(task.last_synced_at, Some(1_000));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_resolutions_are_returned_untouched() {
        let fx = fixture().await;
        let store = LibSqlTaskRepository::new(fx.db.connection());
        let applier = ResolutionApplier::new(&store, &fx.remote, &fx.gate, &fx.mapping);

        let manual = ConflictResolution {
            task_id: fx.task.id,
            remote_id: "page-1".to_string(),
            field: TaskField::Title,
            resolved: Resolved::Pending {
                local: FieldValue::Text("Draft".to_string()),
                remote: FieldValue::Text("Final".to_string()),
            },
            strategy: ResolutionStrategy::Manual,
        };
        let report = applier
            .apply("user-1", &[manual.clone()], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.manual, vec![manual]);
        assert_eq!(report.applied_count(), 0);
        let task = store.get_task("user-1", &fx.task.id).await.unwrap().unwrap();
        assert_eq!(task, fx.task);
        assert_eq!(fx.remote.write_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_token_stops_before_first_write() {
        let fx = fixture().await;
        let store = LibSqlTaskRepository::new(fx.db.connection());
        let applier = ResolutionApplier::new(&store, &fx.remote, &fx.gate, &fx.mapping);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let batch = [resolution(
            &fx.task,
            TaskField::Title,
            FieldValue::Text("Final".to_string()),
            ResolutionSource::Remote,
        )];

        let err = applier.apply("user-1", &batch, &cancel).await.unwrap_err();
        assert!(matches!(err, ApplyError::Cancelled(_)));
        assert_eq!(err.report().applied_count(), 0);
        let task = store.get_task("user-1", &fx.task.id).await.unwrap().unwrap();
        assert_eq!(task.title, "Draft");
    }
}
