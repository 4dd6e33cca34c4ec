//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 4;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }
    if version < 3 {
        migrate_v3(conn).await?;
    }
    if version < 4 {
        migrate_v4(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Execute `statements` inside one transaction, rolling back on failure
async fn run_in_transaction(conn: &Connection, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }
    Ok(())
}

/// Migration to version 1: Tasks
async fn migrate_v1(conn: &Connection) -> Result<()> {
    run_in_transaction(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'todo',
                priority TEXT,
                estimate REAL,
                due_date TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                remote_page_id TEXT,
                remote_database_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_synced_at INTEGER
            )",
            "CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id, updated_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_remote_database
                ON tasks(user_id, remote_database_id)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_remote_page
                ON tasks(user_id, remote_page_id)
                WHERE remote_page_id IS NOT NULL",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: Field mappings
async fn migrate_v2(conn: &Connection) -> Result<()> {
    run_in_transaction(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS field_mappings (
                user_id TEXT NOT NULL,
                database_id TEXT NOT NULL,
                fields TEXT NOT NULL,
                config TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, database_id)
            )",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version 2");
    Ok(())
}

/// Migration to version 3: Sync status tracking
async fn migrate_v3(conn: &Connection) -> Result<()> {
    run_in_transaction(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS sync_status (
                user_id TEXT NOT NULL,
                database_id TEXT NOT NULL,
                state TEXT NOT NULL CHECK (state IN ('idle', 'running', 'error')),
                error TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, database_id)
            )",
            "INSERT INTO schema_version (version) VALUES (3)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version 3");
    Ok(())
}

/// Migration to version 4: Owner token for running cycles
async fn migrate_v4(conn: &Connection) -> Result<()> {
    run_in_transaction(
        conn,
        &[
            "ALTER TABLE sync_status ADD COLUMN cycle_id TEXT",
            "INSERT INTO schema_version (version) VALUES (4)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = ?
                )",
                [name],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_create_sync_tables() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        assert!(table_exists(&conn, "tasks").await);
        assert!(table_exists(&conn, "field_mappings").await);
        assert!(table_exists(&conn, "sync_status").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upgrade_from_v3_adds_cycle_owner() {
        let conn = setup().await;
        migrate_v1(&conn).await.unwrap();
        migrate_v2(&conn).await.unwrap();
        migrate_v3(&conn).await.unwrap();
        conn.execute(
            "INSERT INTO sync_status (user_id, database_id, state, updated_at)
             VALUES ('user-1', 'db-1', 'idle', 0)",
            (),
        )
        .await
        .unwrap();

        run(&conn).await.unwrap();
        assert_eq!(get_version(&conn).await.unwrap(), 4);

        let mut rows = conn
            .query("SELECT cycle_id FROM sync_status WHERE user_id = 'user-1'", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert!(matches!(row.get_value(0).unwrap(), libsql::Value::Null));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_status_rejects_unknown_state() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let result = conn
            .execute(
                "INSERT INTO sync_status (user_id, database_id, state, updated_at)
                 VALUES ('user-1', 'db-1', 'paused', 0)",
                (),
            )
            .await;
        assert!(result.is_err());
    }
}
