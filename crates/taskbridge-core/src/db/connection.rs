//! Database connection management

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

/// Database wrapper for libSQL connections
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        Self::from_libsql(db).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::from_libsql(db).await
    }

    async fn from_libsql(db: LibSqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        let database = Self { _db: db, conn };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Configure `SQLite` for optimal performance
    async fn configure(&self) -> Result<()> {
        // journal_mode returns a row, and in-memory databases reject WAL.
        self.conn
            .query("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        self.conn
            .execute("PRAGMA busy_timeout = 5000;", ())
            .await
            .ok();
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        let mut rows = db.connection().query("SELECT 1", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_file_is_reopenable() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("taskbridge.db");

        {
            let db = Database::open(&db_path).await.unwrap();
            db.connection()
                .execute(
                    "INSERT INTO sync_status (user_id, database_id, state, updated_at)
                     VALUES ('user-1', 'db-1', 'idle', 1)",
                    (),
                )
                .await
                .unwrap();
        }

        let reopened = Database::open(&db_path).await.unwrap();
        let mut rows = reopened
            .connection()
            .query("SELECT COUNT(*) FROM sync_status", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }
}
