//! In-process remote workspace

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::{merge_properties, RemoteClient, RemoteError};
use crate::models::{FieldValue, RemoteRecord};
use crate::util::unix_millis_now;

/// Remote workspace held in memory.
///
/// Useful for embedding callers and tests; supports injecting failures.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    pages: Arc<Mutex<BTreeMap<String, RemoteRecord>>>,
    faults: Arc<Mutex<Faults>>,
    fetches: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
}

#[derive(Default)]
struct Faults {
    unavailable_fetches: u32,
    rate_limited_calls: u32,
    retry_after: Option<Duration>,
    rejected_properties: HashSet<String>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a page
    pub async fn insert_page(&self, record: RemoteRecord) {
        self.pages.lock().await.insert(record.id.clone(), record);
    }

    /// Current snapshot of a page
    pub async fn page(&self, page_id: &str) -> Option<RemoteRecord> {
        self.pages.lock().await.get(page_id).cloned()
    }

    /// Fail the next `count` fetches as unavailable
    pub async fn fail_next_fetches(&self, count: u32) {
        self.faults.lock().await.unavailable_fetches = count;
    }

    /// Answer the next `count` calls with a rate-limit signal
    pub async fn rate_limit_next(&self, count: u32, retry_after: Option<Duration>) {
        let mut faults = self.faults.lock().await;
        faults.rate_limited_calls = count;
        faults.retry_after = retry_after;
    }

    /// Reject every write that touches `property`
    pub async fn reject_writes_to(&self, property: impl Into<String>) {
        self.faults
            .lock()
            .await
            .rejected_properties
            .insert(property.into());
    }

    /// Stop rejecting writes
    pub async fn clear_write_rejections(&self) {
        self.faults.lock().await.rejected_properties.clear();
    }

    /// Number of fetch attempts received
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Number of write attempts received
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    async fn take_rate_limit(&self) -> Option<RemoteError> {
        let mut faults = self.faults.lock().await;
        if faults.rate_limited_calls == 0 {
            return None;
        }
        faults.rate_limited_calls -= 1;
        Some(RemoteError::RateLimited {
            retry_after: faults.retry_after,
        })
    }
}

impl RemoteClient for MemoryRemote {
    async fn fetch_page(&self, page_id: &str) -> Result<RemoteRecord, RemoteError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.take_rate_limit().await {
            return Err(error);
        }
        {
            let mut faults = self.faults.lock().await;
            if faults.unavailable_fetches > 0 {
                faults.unavailable_fetches -= 1;
                return Err(RemoteError::Unavailable("injected outage".to_string()));
            }
        }

        self.page(page_id)
            .await
            .ok_or_else(|| RemoteError::NotFound(page_id.to_string()))
    }

    async fn write_properties(
        &self,
        page_id: &str,
        properties: &BTreeMap<String, FieldValue>,
    ) -> Result<(), RemoteError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.take_rate_limit().await {
            return Err(error);
        }
        {
            let faults = self.faults.lock().await;
            if let Some(property) = properties
                .keys()
                .find(|property| faults.rejected_properties.contains(*property))
            {
                return Err(RemoteError::Rejected(format!(
                    "property '{property}' is read-only"
                )));
            }
        }

        let mut pages = self.pages.lock().await;
        let record = pages
            .get_mut(page_id)
            .ok_or_else(|| RemoteError::NotFound(page_id.to_string()))?;
        merge_properties(record, properties, unix_millis_now());
        Ok(())
    }
}
