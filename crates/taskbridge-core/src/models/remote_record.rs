//! Snapshot of a remote page

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::value::FieldValue;

/// A remote page as fetched for one sync cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Remote-assigned page identifier
    pub id: String,
    /// Last remote edit (Unix ms)
    pub last_edited_time: i64,
    /// Property identifier to value
    #[serde(default)]
    pub properties: BTreeMap<String, FieldValue>,
}

impl RemoteRecord {
    pub fn new(id: impl Into<String>, last_edited_time: i64) -> Self {
        Self {
            id: id.into(),
            last_edited_time,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, property: impl Into<String>, value: FieldValue) -> Self {
        self.properties.insert(property.into(), value);
        self
    }

    /// Value of `property`; absent properties read as empty
    pub fn property(&self, property: &str) -> FieldValue {
        self.properties.get(property).cloned().unwrap_or_default()
    }
}
