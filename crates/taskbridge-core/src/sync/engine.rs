//! Sync cycle orchestration

use libsql::Connection;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::applier::{ApplyError, ApplyReport, ApplyStage, FieldFailure, ResolutionApplier};
use super::{detector, resolver};
use crate::config::SyncSettings;
use crate::db::{
    Database, LibSqlMappingRepository, LibSqlSyncStatusRepository, LibSqlTaskRepository,
    MappingRepository, SyncStatusRepository, TaskStore,
};
use crate::gate::RateGate;
use crate::models::{
    FieldMapping, ResolutionStrategy, SyncConflict, SyncState, SyncStatus, Task,
};
use crate::remote::RemoteClient;
use crate::util::{compact_text, unix_millis_now};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No field mapping for database {database_id}")]
    MappingNotFound { user_id: String, database_id: String },
    #[error("A sync cycle is already running for database {database_id}")]
    ConcurrentCycleRejected { user_id: String, database_id: String },
    #[error(transparent)]
    Store(#[from] crate::Error),
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Every divergence was applied
    Applied,
    /// Everything else applied; some conflicts await a human decision
    ManualPending,
    /// At least one field or page failed
    PartialApplyFailure,
    /// The remote stayed unavailable through the gate's backoff
    RemoteUnavailable,
    Cancelled,
}

impl CycleOutcome {
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Applied | Self::ManualPending)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub user_id: String,
    pub database_id: String,
    pub strategy: ResolutionStrategy,
    pub applied_count: usize,
    /// Conflicts left for explicit user action
    pub manual_conflicts: Vec<SyncConflict>,
    pub failures: Vec<FieldFailure>,
    /// Status row as written when the cycle finished
    pub status: SyncStatus,
    pub outcome: CycleOutcome,
}

/// Running totals while a cycle walks its tasks
#[derive(Default)]
struct Tally {
    applied: usize,
    manual_conflicts: Vec<SyncConflict>,
    failures: Vec<FieldFailure>,
    remote_unavailable: Option<String>,
    cancelled: bool,
    /// Another cycle took the status row over after it went stale
    superseded: bool,
}

impl Tally {
    fn absorb(&mut self, report: ApplyReport, task: &Task, remote_edited_at: i64) {
        self.applied += report.applied_count();
        self.manual_conflicts.extend(
            report
                .manual
                .iter()
                .filter_map(|resolution| {
                    resolution.as_pending_conflict(task.updated_at, remote_edited_at)
                }),
        );
        self.failures.extend(report.failures);
    }

    fn outcome(&self) -> CycleOutcome {
        if self.cancelled || self.superseded {
            CycleOutcome::Cancelled
        } else if self.remote_unavailable.is_some() {
            CycleOutcome::RemoteUnavailable
        } else if !self.failures.is_empty() {
            CycleOutcome::PartialApplyFailure
        } else if !self.manual_conflicts.is_empty() {
            CycleOutcome::ManualPending
        } else {
            CycleOutcome::Applied
        }
    }

    /// Status detail for cycles that end in `error`
    fn error_detail(&self) -> Option<String> {
        let detail = match self.outcome() {
            CycleOutcome::Applied | CycleOutcome::ManualPending => return None,
            CycleOutcome::Cancelled => {
                format!("cancelled after {} field(s) applied", self.applied)
            }
            CycleOutcome::RemoteUnavailable => format!(
                "remote unavailable after {} field(s) applied: {}",
                self.applied,
                self.remote_unavailable.as_deref().unwrap_or_default()
            ),
            CycleOutcome::PartialApplyFailure => {
                let first = self
                    .failures
                    .first()
                    .map(|failure| failure.error.as_str())
                    .unwrap_or_default();
                format!(
                    "{} field write(s) failed, {} applied: {first}",
                    self.failures.len(),
                    self.applied
                )
            }
        };
        Some(compact_text(&detail))
    }
}

/// Runs sync cycles for one local store against one remote workspace
pub struct SyncEngine<'a, T, R> {
    conn: &'a Connection,
    store: T,
    remote: R,
    gate: RateGate,
    settings: SyncSettings,
}

impl<'a, R: RemoteClient> SyncEngine<'a, LibSqlTaskRepository<'a>, R> {
    /// Engine backed entirely by `db`
    pub fn new(db: &'a Database, remote: R, settings: SyncSettings) -> Self {
        Self::with_store(
            db.connection(),
            LibSqlTaskRepository::new(db.connection()),
            remote,
            settings,
        )
    }
}

impl<'a, T: TaskStore, R: RemoteClient> SyncEngine<'a, T, R> {
    /// Engine with a custom task store; mappings and status live in `conn`
    pub fn with_store(conn: &'a Connection, store: T, remote: R, settings: SyncSettings) -> Self {
        let gate = RateGate::new(settings.gate.clone());
        Self {
            conn,
            store,
            remote,
            gate,
            settings,
        }
    }

    /// Share an existing gate, e.g. across engines using one remote account
    #[must_use]
    pub fn with_gate(mut self, gate: RateGate) -> Self {
        self.gate = gate;
        self
    }

    pub const fn gate(&self) -> &RateGate {
        &self.gate
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Run one cycle. `None` uses the mapping's default strategy.
    pub async fn run_sync_cycle(
        &self,
        user_id: &str,
        database_id: &str,
        strategy: Option<ResolutionStrategy>,
    ) -> Result<CycleReport, SyncError> {
        self.run_sync_cycle_with_cancel(user_id, database_id, strategy, &CancellationToken::new())
            .await
    }

    /// Run one cycle that stops between field writes once `cancel` fires
    pub async fn run_sync_cycle_with_cancel(
        &self,
        user_id: &str,
        database_id: &str,
        strategy: Option<ResolutionStrategy>,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, SyncError> {
        let mapping = LibSqlMappingRepository::new(self.conn)
            .get_mapping(user_id, database_id)
            .await?
            .ok_or_else(|| SyncError::MappingNotFound {
                user_id: user_id.to_string(),
                database_id: database_id.to_string(),
            })?;
        let strategy = strategy.unwrap_or(mapping.config.default_strategy);

        let statuses = LibSqlSyncStatusRepository::new(self.conn);
        let Some(cycle_id) = statuses
            .try_begin_cycle(
                user_id,
                database_id,
                unix_millis_now(),
                self.settings.stale_lock_after,
            )
            .await?
        else {
            tracing::warn!(
                user = user_id,
                database = database_id,
                "Sync cycle already running, rejecting"
            );
            return Err(SyncError::ConcurrentCycleRejected {
                user_id: user_id.to_string(),
                database_id: database_id.to_string(),
            });
        };

        tracing::info!(
            user = user_id,
            database = database_id,
            strategy = %strategy,
            cycle = cycle_id.as_str(),
            "Sync cycle started"
        );

        let tally = match self
            .run_locked(user_id, &mapping, strategy, &cycle_id, cancel)
            .await
        {
            Ok(tally) => tally,
            Err(err) => {
                let detail = compact_text(&err.to_string());
                if let Err(release) = statuses
                    .finish_cycle(
                        user_id,
                        database_id,
                        &cycle_id,
                        SyncState::Error,
                        Some(&detail),
                        unix_millis_now(),
                    )
                    .await
                {
                    tracing::warn!(
                        user = user_id,
                        database = database_id,
                        error = %release,
                        "Failed to release sync status"
                    );
                }
                return Err(err.into());
            }
        };

        let outcome = tally.outcome();
        let detail = tally.error_detail();
        let state = if outcome.is_success() {
            SyncState::Idle
        } else {
            SyncState::Error
        };
        let finished_at = unix_millis_now();
        let released = statuses
            .finish_cycle(
                user_id,
                database_id,
                &cycle_id,
                state,
                detail.as_deref(),
                finished_at,
            )
            .await?;
        if !released {
            tracing::warn!(
                user = user_id,
                database = database_id,
                "Sync status was taken over before the cycle finished"
            );
        }

        let status = statuses
            .get_sync_status(user_id, database_id)
            .await?
            .unwrap_or_else(|| SyncStatus {
                user_id: user_id.to_string(),
                database_id: database_id.to_string(),
                state,
                error: detail.clone(),
                updated_at: finished_at,
            });

        tracing::info!(
            user = user_id,
            database = database_id,
            outcome = ?outcome,
            applied = tally.applied,
            manual = tally.manual_conflicts.len(),
            failures = tally.failures.len(),
            "Sync cycle finished"
        );

        Ok(CycleReport {
            user_id: user_id.to_string(),
            database_id: database_id.to_string(),
            strategy,
            applied_count: tally.applied,
            manual_conflicts: tally.manual_conflicts,
            failures: tally.failures,
            status,
            outcome,
        })
    }

    /// Walk every linked task while holding the `running` status.
    ///
    /// The status row is renewed after each fetch so a long cycle never looks
    /// stale. Once renewal fails the row belongs to another cycle and the walk
    /// stops before touching either side.
    async fn run_locked(
        &self,
        user_id: &str,
        mapping: &FieldMapping,
        strategy: ResolutionStrategy,
        cycle_id: &str,
        cancel: &CancellationToken,
    ) -> crate::Result<Tally> {
        let statuses = LibSqlSyncStatusRepository::new(self.conn);
        let applier = ResolutionApplier::new(&self.store, &self.remote, &self.gate, mapping);
        let tasks = self
            .store
            .list_linked_tasks(user_id, &mapping.database_id)
            .await?;
        let mut tally = Tally::default();

        for task in tasks {
            if cancel.is_cancelled() {
                tally.cancelled = true;
                break;
            }
            let Some(page_id) = task.remote_page_id.as_deref() else {
                continue;
            };

            let fetched = self
                .gate
                .call("fetch_page", || self.remote.fetch_page(page_id))
                .await;
            if !statuses
                .renew_cycle(user_id, &mapping.database_id, cycle_id, unix_millis_now())
                .await?
            {
                tracing::warn!(
                    user = user_id,
                    database = mapping.database_id.as_str(),
                    cycle = cycle_id,
                    "Sync status taken over by another cycle, stopping"
                );
                tally.superseded = true;
                break;
            }

            let record = match fetched {
                Ok(record) => record,
                Err(err) if err.is_retryable() => {
                    tracing::warn!(
                        user = user_id,
                        task = %task.id,
                        error = %err,
                        "Remote unavailable, aborting cycle"
                    );
                    tally.remote_unavailable = Some(err.to_string());
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        user = user_id,
                        task = %task.id,
                        error = %err,
                        "Failed to fetch remote page"
                    );
                    tally.failures.push(FieldFailure {
                        task_id: task.id,
                        remote_id: page_id.to_string(),
                        field: None,
                        stage: ApplyStage::Fetch,
                        error: compact_text(&err.to_string()),
                    });
                    continue;
                }
            };

            // Without a baseline there is nothing to compare against, so the
            // remote values are adopted as the starting point.
            let resolutions = if task.has_sync_baseline() {
                let conflicts = detector::detect(&task, &record, mapping);
                resolver::resolve(&conflicts, strategy)
            } else {
                let divergent = detector::divergent_fields(&task, &record, mapping);
                tracing::debug!(
                    user = user_id,
                    task = %task.id,
                    fields = divergent.len(),
                    "Seeding task from remote page"
                );
                resolver::resolve(&divergent, ResolutionStrategy::RemoteWins)
            };

            let (report, cancelled) = match applier.apply(user_id, &resolutions, cancel).await {
                Ok(report) => (report, false),
                Err(ApplyError::PartialFailure(report)) => (report, false),
                Err(ApplyError::Cancelled(report)) => (report, true),
            };
            let clean = report.failures.is_empty() && report.manual.is_empty();
            tally.absorb(report, &task, record.last_edited_time);

            if cancelled {
                tally.cancelled = true;
                break;
            }
            if clean {
                self.store
                    .mark_synced(user_id, &task.id, unix_millis_now())
                    .await?;
            }
        }

        Ok(tally)
    }
}
