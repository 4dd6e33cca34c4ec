//! Field mapping model

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::strategy::ResolutionStrategy;
use super::task::TaskField;
use crate::error::{Error, Result};

/// Per-database mapping configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Strategy used when a cycle is started without an explicit one
    #[serde(default)]
    pub default_strategy: ResolutionStrategy,
    /// Human-readable name of the remote database
    #[serde(default)]
    pub label: Option<String>,
}

/// Correspondence between local task fields and remote property ids for one
/// (user, remote database) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub user_id: String,
    pub database_id: String,
    /// Iterates in `TaskField` order
    pub fields: BTreeMap<TaskField, String>,
    #[serde(default)]
    pub config: MappingConfig,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl FieldMapping {
    pub fn new(
        user_id: impl Into<String>,
        database_id: impl Into<String>,
        fields: BTreeMap<TaskField, String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            user_id: user_id.into(),
            database_id: database_id.into(),
            fields,
            config: MappingConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: MappingConfig) -> Self {
        self.config = config;
        self
    }

    /// Remote property mapped to `field`
    pub fn property_for(&self, field: TaskField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// Mapped (field, property) pairs in apply order
    pub fn iter(&self) -> impl Iterator<Item = (TaskField, &str)> {
        self.fields
            .iter()
            .map(|(field, property)| (*field, property.as_str()))
    }

    /// Check the invariants required before persisting.
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() || self.database_id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Mapping requires a user and a database id".to_string(),
            ));
        }
        if self.fields.is_empty() {
            return Err(Error::InvalidInput(
                "Mapping must map at least one field".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (field, property) in self.iter() {
            let property = property.trim();
            if property.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "Field '{field}' is mapped to an empty property id"
                )));
            }
            if !seen.insert(property) {
                return Err(Error::InvalidInput(format!(
                    "Property '{property}' is mapped more than once"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(TaskField, &str)]) -> BTreeMap<TaskField, String> {
        pairs
            .iter()
            .map(|(field, property)| (*field, (*property).to_string()))
            .collect()
    }

    #[test]
    fn validate_accepts_distinct_properties() {
        let mapping = FieldMapping::new(
            "user-1",
            "db-1",
            fields(&[(TaskField::Title, "Name"), (TaskField::Status, "Status")]),
        );
        assert!(mapping.validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_and_blank_properties() {
        let duplicate = FieldMapping::new(
            "user-1",
            "db-1",
            fields(&[(TaskField::Title, "Name"), (TaskField::Description, "Name")]),
        );
        assert!(duplicate.validate().is_err());

        let blank = FieldMapping::new("user-1", "db-1", fields(&[(TaskField::Title, "  ")]));
        assert!(blank.validate().is_err());

        let empty = FieldMapping::new("user-1", "db-1", BTreeMap::new());
        assert!(empty.validate().is_err());
    }

    #[test]
    fn iterates_in_field_order() {
        let mapping = FieldMapping::new(
            "user-1",
            "db-1",
            fields(&[
                (TaskField::Completed, "Done"),
                (TaskField::Title, "Name"),
                (TaskField::Status, "Stage"),
            ]),
        );
        let order = mapping.iter().map(|(field, _)| field).collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![TaskField::Title, TaskField::Status, TaskField::Completed]
        );
    }

    #[test]
    fn fields_serialize_with_snake_case_keys() {
        let mapping = FieldMapping::new("user-1", "db-1", fields(&[(TaskField::DueDate, "Due")]));
        let json = serde_json::to_string(&mapping.fields).unwrap();
        assert_eq!(json, r#"{"due_date":"Due"}"#);
    }
}
