//! Field-level divergence detection

use crate::models::{FieldMapping, RemoteRecord, SyncConflict, Task};

/// Conflicts between `local` and `remote` for every mapped field.
///
/// A task that was never synchronized has no baseline, so nothing can
/// conflict yet; first-sync seeding uses [`divergent_fields`] instead.
pub fn detect(local: &Task, remote: &RemoteRecord, mapping: &FieldMapping) -> Vec<SyncConflict> {
    if !local.has_sync_baseline() {
        return Vec::new();
    }
    divergent_fields(local, remote, mapping)
}

/// Every mapped field whose values differ, regardless of sync baseline
pub fn divergent_fields(
    local: &Task,
    remote: &RemoteRecord,
    mapping: &FieldMapping,
) -> Vec<SyncConflict> {
    mapping
        .iter()
        .filter_map(|(field, property)| {
            let local_value = local.field_value(field);
            let remote_value = remote.property(property);
            if local_value.equivalent(&remote_value, field.kind()) {
                return None;
            }
            Some(SyncConflict {
                task_id: local.id,
                remote_id: remote.id.clone(),
                field,
                local_value,
                remote_value,
                local_updated_at: local.updated_at,
                remote_updated_at: remote.last_edited_time,
            })
        })
        .collect()
}
