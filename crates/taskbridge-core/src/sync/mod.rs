//! Sync engine: detect, resolve and apply field conflicts between local
//! tasks and remote pages, one cycle per (user, remote database).

mod applier;
mod detector;
mod engine;
mod resolver;


pub use crate::models::ResolutionStrategy;
pub use applier::{ApplyError, ApplyReport, ApplyStage, FieldFailure, ResolutionApplier};
pub use detector::{detect, divergent_fields};
pub use engine::{CycleOutcome, CycleReport, SyncEngine, SyncError};
pub use resolver::resolve;
