//! Remote workspace exported as a directory of JSON pages

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{merge_properties, RemoteClient, RemoteError};
use crate::models::{FieldValue, RemoteRecord};
use crate::util::unix_millis_now;

/// One `<page id>.json` file per page, each a serialized [`RemoteRecord`].
#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    root: PathBuf,
}

impl DirectoryRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn page_path(&self, page_id: &str) -> Result<PathBuf, RemoteError> {
        let valid = !page_id.is_empty()
            && page_id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'));
        if !valid {
            return Err(RemoteError::Rejected(format!(
                "Invalid page id '{page_id}'"
            )));
        }
        Ok(self.root.join(format!("{page_id}.json")))
    }

    async fn read_page(&self, page_id: &str) -> Result<RemoteRecord, RemoteError> {
        let path = self.page_path(page_id)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RemoteError::NotFound(page_id.to_string()));
            }
            Err(err) => {
                return Err(RemoteError::Unavailable(format!(
                    "{}: {err}",
                    path.display()
                )));
            }
        };

        let mut record: RemoteRecord = serde_json::from_str(&raw).map_err(|err| {
            RemoteError::Rejected(format!("Malformed page {}: {err}", path.display()))
        })?;
        // The file name is the page identity; an embedded id is ignored.
        record.id = page_id.to_string();
        Ok(record)
    }

    /// Write via a sibling temp file and rename so readers never see a torn page
    async fn write_page(&self, page_id: &str, record: &RemoteRecord) -> Result<(), RemoteError> {
        let path = self.page_path(page_id)?;
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(record)
            .map_err(|err| RemoteError::Rejected(err.to_string()))?;

        tokio::fs::write(&tmp, body)
            .await
            .map_err(|err| RemoteError::Unavailable(format!("{}: {err}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|err| RemoteError::Unavailable(format!("{}: {err}", path.display())))
    }
}

impl RemoteClient for DirectoryRemote {
    async fn fetch_page(&self, page_id: &str) -> Result<RemoteRecord, RemoteError> {
        self.read_page(page_id).await
    }

    async fn write_properties(
        &self,
        page_id: &str,
        properties: &BTreeMap<String, FieldValue>,
    ) -> Result<(), RemoteError> {
        let mut record = self.read_page(page_id).await?;
        if merge_properties(&mut record, properties, unix_millis_now()) {
            self.write_page(page_id, &record).await?;
        }
        tracing::debug!(page = page_id, properties = properties.len(), "Wrote page properties");
        Ok(())
    }
}
