//! taskbridge-core - Core library for taskbridge
//!
//! This crate contains the task models, the libSQL storage layer, the rate
//! gate that guards the remote workspace API, and the sync engine that keeps
//! local tasks and remote pages converged.

pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod models;
pub mod remote;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{FieldMapping, FieldValue, SyncState, SyncStatus, Task, TaskField, TaskId};
pub use sync::{CycleOutcome, CycleReport, ResolutionStrategy, SyncEngine, SyncError};
