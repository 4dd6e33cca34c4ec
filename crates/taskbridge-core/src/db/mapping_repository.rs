//! Field mapping repository implementation

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{FieldMapping, MappingConfig};

/// Trait for field mapping storage operations (async)
#[allow(async_fn_in_trait)]
pub trait MappingRepository {
    /// Insert or replace the mapping for its (user, database) pair
    async fn save_mapping(&self, mapping: &FieldMapping) -> Result<FieldMapping>;

    /// Get the mapping for a (user, database) pair
    async fn get_mapping(&self, user_id: &str, database_id: &str) -> Result<Option<FieldMapping>>;

    /// List all mappings of a user, ordered by database id
    async fn list_mappings(&self, user_id: &str) -> Result<Vec<FieldMapping>>;

    /// Delete a mapping; returns whether one existed
    async fn delete_mapping(&self, user_id: &str, database_id: &str) -> Result<bool>;

    /// Check whether a mapping exists
    async fn mapping_exists(&self, user_id: &str, database_id: &str) -> Result<bool>;
}

/// libSQL implementation of `MappingRepository`
pub struct LibSqlMappingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMappingRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a mapping from a database row
    fn parse_mapping(row: &libsql::Row) -> Result<FieldMapping> {
        let fields: String = row.get(2)?;
        let config: String = row.get(3)?;
        Ok(FieldMapping {
            user_id: row.get(0)?,
            database_id: row.get(1)?,
            fields: serde_json::from_str(&fields)?,
            config: serde_json::from_str::<MappingConfig>(&config)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl MappingRepository for LibSqlMappingRepository<'_> {
    async fn save_mapping(&self, mapping: &FieldMapping) -> Result<FieldMapping> {
        mapping.validate()?;

        let now = chrono::Utc::now().timestamp_millis();
        let fields = serde_json::to_string(&mapping.fields)?;
        let config = serde_json::to_string(&mapping.config)?;

        // Remapping keeps the original creation time.
        self.conn
            .execute(
                "INSERT INTO field_mappings
                    (user_id, database_id, fields, config, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT (user_id, database_id) DO UPDATE SET
                    fields = excluded.fields,
                    config = excluded.config,
                    updated_at = excluded.updated_at",
                params![
                    mapping.user_id.as_str(),
                    mapping.database_id.as_str(),
                    fields,
                    config,
                    mapping.created_at,
                    now
                ],
            )
            .await?;

        tracing::debug!(
            user = mapping.user_id.as_str(),
            database = mapping.database_id.as_str(),
            fields = mapping.fields.len(),
            "Saved field mapping"
        );

        self.get_mapping(&mapping.user_id, &mapping.database_id)
            .await?
            .ok_or_else(|| crate::Error::NotFound(mapping.database_id.clone()))
    }

    async fn get_mapping(&self, user_id: &str, database_id: &str) -> Result<Option<FieldMapping>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id, database_id, fields, config, created_at, updated_at
                 FROM field_mappings WHERE user_id = ? AND database_id = ?",
                params![user_id, database_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_mapping(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_mappings(&self, user_id: &str) -> Result<Vec<FieldMapping>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id, database_id, fields, config, created_at, updated_at
                 FROM field_mappings WHERE user_id = ? ORDER BY database_id ASC",
                [user_id],
            )
            .await?;

        let mut mappings = Vec::new();
        while let Some(row) = rows.next().await? {
            mappings.push(Self::parse_mapping(&row)?);
        }
        Ok(mappings)
    }

    async fn delete_mapping(&self, user_id: &str, database_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM field_mappings WHERE user_id = ? AND database_id = ?",
                params![user_id, database_id],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn mapping_exists(&self, user_id: &str, database_id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM field_mappings WHERE user_id = ? AND database_id = ?
                )",
                params![user_id, database_id],
            )
            .await?;

        Ok(match rows.next().await? {
            Some(row) => row.get::<i32>(0)? != 0,
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{ResolutionStrategy, TaskField};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn mapping(user_id: &str, database_id: &str) -> FieldMapping {
        let fields = BTreeMap::from([
            (TaskField::Title, "Name".to_string()),
            (TaskField::Status, "Stage".to_string()),
        ]);
        FieldMapping::new(user_id, database_id, fields)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_and_get_mapping() {
        let db = setup().await;
        let repo = LibSqlMappingRepository::new(db.connection());

        let saved = repo.save_mapping(&mapping("user-1", "db-1")).await.unwrap();
        let fetched = repo.get_mapping("user-1", "db-1").await.unwrap().unwrap();
        assert_eq!(fetched, saved);
        assert_eq!(fetched.property_for(TaskField::Status), Some("Stage"));
        assert!(repo.mapping_exists("user-1", "db-1").await.unwrap());
        assert!(!repo.mapping_exists("user-2", "db-1").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remap_overwrites_and_keeps_created_at() {
        let db = setup().await;
        let repo = LibSqlMappingRepository::new(db.connection());

        let mut original = mapping("user-1", "db-1");
        original.created_at = 1_000;
        repo.save_mapping(&original).await.unwrap();

        let mut remapped = mapping("user-1", "db-1").with_config(MappingConfig {
            default_strategy: ResolutionStrategy::Manual,
            label: Some("Roadmap".to_string()),
        });
        remapped.fields.insert(TaskField::DueDate, "Due".to_string());
        let saved = repo.save_mapping(&remapped).await.unwrap();

        assert_eq!(saved.created_at, 1_000);
        assert_eq!(saved.fields.len(), 3);
        assert_eq!(saved.config.default_strategy, ResolutionStrategy::Manual);
        assert_eq!(repo.list_mappings("user-1").await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_rejects_invalid_mapping() {
        let db = setup().await;
        let repo = LibSqlMappingRepository::new(db.connection());

        let invalid = FieldMapping::new("user-1", "db-1", BTreeMap::new());
        assert!(repo.save_mapping(&invalid).await.is_err());
        assert!(repo.get_mapping("user-1", "db-1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_and_delete_are_scoped_per_user() {
        let db = setup().await;
        let repo = LibSqlMappingRepository::new(db.connection());

        repo.save_mapping(&mapping("user-1", "db-b")).await.unwrap();
        repo.save_mapping(&mapping("user-1", "db-a")).await.unwrap();
        repo.save_mapping(&mapping("user-2", "db-a")).await.unwrap();

        let listed = repo.list_mappings("user-1").await.unwrap();
        let databases = listed
            .iter()
            .map(|mapping| mapping.database_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(databases, vec!["db-a", "db-b"]);

        assert!(repo.delete_mapping("user-1", "db-a").await.unwrap());
        assert!(!repo.delete_mapping("user-1", "db-a").await.unwrap());
        assert!(repo.get_mapping("user-2", "db-a").await.unwrap().is_some());
    }
}
