//! Data models for taskbridge

mod mapping;
mod remote_record;
mod strategy;
mod sync_conflict;
mod sync_status;
mod task;
mod value;

pub use mapping::{FieldMapping, MappingConfig};
pub use remote_record::RemoteRecord;
pub use strategy::ResolutionStrategy;
pub use sync_conflict::{ConflictResolution, ResolutionSource, Resolved, SyncConflict};
pub use sync_status::{SyncState, SyncStatus};
pub use task::{Task, TaskField, TaskId};
pub use value::{FieldKind, FieldValue};
