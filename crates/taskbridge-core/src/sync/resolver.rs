//! Strategy-driven conflict resolution

use crate::models::{
    ConflictResolution, ResolutionSource, ResolutionStrategy, Resolved, SyncConflict,
};

/// Resolve each conflict under `strategy`, one resolution per conflict in
/// input order. Pure.
pub fn resolve(conflicts: &[SyncConflict], strategy: ResolutionStrategy) -> Vec<ConflictResolution> {
    conflicts
        .iter()
        .map(|conflict| ConflictResolution {
            task_id: conflict.task_id,
            remote_id: conflict.remote_id.clone(),
            field: conflict.field,
            resolved: resolve_one(conflict, strategy),
            strategy,
        })
        .collect()
}

fn resolve_one(conflict: &SyncConflict, strategy: ResolutionStrategy) -> Resolved {
    let local = || Resolved::Value {
        value: conflict.local_value.clone(),
        source: ResolutionSource::Local,
    };
    let remote = || Resolved::Value {
        value: conflict.remote_value.clone(),
        source: ResolutionSource::Remote,
    };

    match strategy {
        ResolutionStrategy::RemoteWins => remote(),
        ResolutionStrategy::LocalWins => local(),
        ResolutionStrategy::LatestWins => {
            if conflict.local_updated_at > conflict.remote_updated_at {
                local()
            } else {
                remote()
            }
        }
        ResolutionStrategy::Manual => Resolved::Pending {
            local: conflict.local_value.clone(),
            remote: conflict.remote_value.clone(),
        },
    }
}
