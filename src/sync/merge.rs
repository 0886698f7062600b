//! Three-way merge of divergent entity edits.
//!
//! Given the base snapshot captured at enqueue time, the local intended
//! payload, and the current remote state, each mergeable field is
//! compared independently. Non-overlapping changes combine; a field
//! changed on both sides to different values fails the whole merge with
//! no partial result. Monetary fields compare as exact integers, so
//! rounding can never manufacture a conflict.

use serde_json::Value;

use super::mutation::EntityKind;

/// Result of a three-way merge attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Remote state combined with all local-only changes.
    Merged(Value),
    /// Fields changed on both sides to different values.
    Conflict(Vec<String>),
}

fn field<'a>(payload: &'a Value, name: &str) -> &'a Value {
    payload.get(name).unwrap_or(&Value::Null)
}

/// Merges `local` and `remote` against their common `base`.
///
/// The merged result starts from the remote state (whose bookkeeping
/// fields are authoritative) and applies every field only the local
/// side changed. Overlapping fields are collected and reported
/// together so the conflict surface can show all of them at once.
pub fn three_way_merge(
    entity: EntityKind,
    base: &Value,
    local: &Value,
    remote: &Value,
) -> MergeOutcome {
    let mut merged = remote.clone();
    let mut overlaps = Vec::new();

    for name in entity.mergeable_fields() {
        let base_value = field(base, name);
        let local_value = field(local, name);
        let remote_value = field(remote, name);

        let local_changed = local_value != base_value;
        let remote_changed = remote_value != base_value;

        match (local_changed, remote_changed) {
            // Local-only change wins the field.
            (true, false) => {
                if let Some(obj) = merged.as_object_mut() {
                    obj.insert(name.to_string(), local_value.clone());
                }
            }
            // Remote-only change: already present in the merged state.
            (false, true) => {}
            (true, true) => {
                if local_value != remote_value {
                    overlaps.push(name.to_string());
                }
                // Both sides converged on the same value: no conflict.
            }
            (false, false) => {}
        }
    }

    if overlaps.is_empty() {
        MergeOutcome::Merged(merged)
    } else {
        MergeOutcome::Conflict(overlaps)
    }
}
