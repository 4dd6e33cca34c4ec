//! Sync status repository implementation

use std::time::Duration;

use libsql::{params, Connection};
use uuid::Uuid;

use super::row::{optional_text, text_or_null};
use crate::error::Result;
use crate::models::{SyncState, SyncStatus};

/// Trait for sync status storage operations (async)
///
/// There is exactly one row per (user, database); writes overwrite it.
#[allow(async_fn_in_trait)]
pub trait SyncStatusRepository {
    /// Get the status row, if any cycle has ever touched the pair
    async fn get_sync_status(&self, user_id: &str, database_id: &str)
        -> Result<Option<SyncStatus>>;

    /// Unconditionally overwrite the status row
    async fn update_sync_status(
        &self,
        user_id: &str,
        database_id: &str,
        state: SyncState,
        error: Option<&str>,
    ) -> Result<SyncStatus>;

    /// Atomically transition the pair to `running`.
    ///
    /// Returns the new owner token, or `None` when another cycle holds a
    /// `running` row that is newer than `stale_after`.
    async fn try_begin_cycle(
        &self,
        user_id: &str,
        database_id: &str,
        now: i64,
        stale_after: Duration,
    ) -> Result<Option<String>>;

    /// Refresh `updated_at` of a running cycle. Returns `false` once the
    /// row belongs to another cycle.
    async fn renew_cycle(
        &self,
        user_id: &str,
        database_id: &str,
        cycle_id: &str,
        now: i64,
    ) -> Result<bool>;

    /// Transition out of `running`. Returns `false` if `cycle_id` no longer
    /// owns the row (for example after a stale-lock takeover).
    async fn finish_cycle(
        &self,
        user_id: &str,
        database_id: &str,
        cycle_id: &str,
        state: SyncState,
        error: Option<&str>,
        now: i64,
    ) -> Result<bool>;
}

/// libSQL implementation of `SyncStatusRepository`
pub struct LibSqlSyncStatusRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStatusRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_status(row: &libsql::Row) -> Result<SyncStatus> {
        let state: String = row.get(2)?;
        Ok(SyncStatus {
            user_id: row.get(0)?,
            database_id: row.get(1)?,
            state: state.parse()?,
            error: optional_text(row, 3)?,
            updated_at: row.get(4)?,
        })
    }
}

impl SyncStatusRepository for LibSqlSyncStatusRepository<'_> {
    async fn get_sync_status(
        &self,
        user_id: &str,
        database_id: &str,
    ) -> Result<Option<SyncStatus>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id, database_id, state, error, updated_at
                 FROM sync_status WHERE user_id = ? AND database_id = ?",
                params![user_id, database_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_status(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_sync_status(
        &self,
        user_id: &str,
        database_id: &str,
        state: SyncState,
        error: Option<&str>,
    ) -> Result<SyncStatus> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn
            .execute(
                "INSERT INTO sync_status (user_id, database_id, state, error, updated_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT (user_id, database_id) DO UPDATE SET
                    state = excluded.state,
                    error = excluded.error,
                    updated_at = excluded.updated_at,
                    cycle_id = NULL",
                params![user_id, database_id, state.as_str(), text_or_null(error), now],
            )
            .await?;

        Ok(SyncStatus {
            user_id: user_id.to_string(),
            database_id: database_id.to_string(),
            state,
            error: error.map(str::to_string),
            updated_at: now,
        })
    }

    async fn try_begin_cycle(
        &self,
        user_id: &str,
        database_id: &str,
        now: i64,
        stale_after: Duration,
    ) -> Result<Option<String>> {
        let stale_ms = i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX);
        let stale_before = now.saturating_sub(stale_ms);
        let previous = self.get_sync_status(user_id, database_id).await?;
        let cycle_id = Uuid::now_v7().to_string();

        // Single upsert so two concurrent starts cannot both observe "not running".
        let rows = self
            .conn
            .execute(
                "INSERT INTO sync_status (user_id, database_id, state, error, updated_at, cycle_id)
                 VALUES (?, ?, 'running', NULL, ?, ?)
                 ON CONFLICT (user_id, database_id) DO UPDATE SET
                    state = 'running',
                    error = NULL,
                    updated_at = excluded.updated_at,
                    cycle_id = excluded.cycle_id
                 WHERE sync_status.state != 'running' OR sync_status.updated_at < ?",
                params![user_id, database_id, now, cycle_id.as_str(), stale_before],
            )
            .await?;

        if rows == 0 {
            return Ok(None);
        }
        if previous
            .as_ref()
            .is_some_and(|status| status.state == SyncState::Running)
        {
            tracing::warn!(
                user = user_id,
                database = database_id,
                "Took over stale running sync status"
            );
        }
        Ok(Some(cycle_id))
    }

    async fn renew_cycle(
        &self,
        user_id: &str,
        database_id: &str,
        cycle_id: &str,
        now: i64,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_status SET updated_at = ?
                 WHERE user_id = ? AND database_id = ? AND state = 'running' AND cycle_id = ?",
                params![now, user_id, database_id, cycle_id],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn finish_cycle(
        &self,
        user_id: &str,
        database_id: &str,
        cycle_id: &str,
        state: SyncState,
        error: Option<&str>,
        now: i64,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_status SET state = ?, error = ?, updated_at = ?, cycle_id = NULL
                 WHERE user_id = ? AND database_id = ? AND state = 'running' AND cycle_id = ?",
                params![
                    state.as_str(),
                    text_or_null(error),
                    now,
                    user_id,
                    database_id,
                    cycle_id
                ],
            )
            .await?;
        Ok(rows > 0)
    }
}
