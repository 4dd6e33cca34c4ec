//! Remote workspace API contract
//!
//! The engine only needs two calls: fetch one page and write properties on
//! one page. Pagination, auth and transport belong to the client behind
//! [`RemoteClient`].

mod directory;
mod memory;

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::gate::GateError;
use crate::models::{FieldValue, RemoteRecord};

pub use directory::DirectoryRemote;
pub use memory::MemoryRemote;

/// Errors returned by a remote client
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transient transport or server failure
    #[error("Remote API unavailable: {0}")]
    Unavailable(String),
    /// The remote asked us to slow down
    #[error("Remote API rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Remote page not found: {0}")]
    NotFound(String),
    /// Permanent rejection (bad property, validation failure)
    #[error("Remote API rejected request: {0}")]
    Rejected(String),
    /// The local rate gate gave up waiting for capacity
    #[error(transparent)]
    Throttled(#[from] GateError),
}

impl RemoteError {
    /// Whether the request may succeed if repeated later
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::RateLimited { .. } | Self::Throttled(_)
        )
    }

    /// Server-provided delay before the next attempt
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Narrow remote API surface used by the sync engine
#[allow(async_fn_in_trait)]
pub trait RemoteClient {
    /// Fetch the current snapshot of a page
    async fn fetch_page(&self, page_id: &str) -> Result<RemoteRecord, RemoteError>;

    /// Write property values on a page
    async fn write_properties(
        &self,
        page_id: &str,
        properties: &BTreeMap<String, FieldValue>,
    ) -> Result<(), RemoteError>;
}

/// Merge `properties` into `record`, bumping `last_edited_time` only when a
/// value actually changed. Returns whether anything changed.
fn merge_properties(
    record: &mut RemoteRecord,
    properties: &BTreeMap<String, FieldValue>,
    edited_at: i64,
) -> bool {
    let mut changed = false;
    for (property, value) in properties {
        if record.properties.get(property) != Some(value) {
            record.properties.insert(property.clone(), value.clone());
            changed = true;
        }
    }
    if changed {
        record.last_edited_time = edited_at.max(record.last_edited_time);
    }
    changed
}
