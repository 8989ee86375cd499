//! Segment routing on status transitions.

use crate::models::item::QueueItem;

/// Resolve the segment an item should occupy after a status change.
///
/// The first condition whose status equals `new_status` wins; otherwise the
/// plan's `next_segment` applies. Items without a plan, and calls where the
/// status did not actually change, keep their current segment.
#[must_use]
pub fn evaluate(item: &QueueItem, old_status: &str, new_status: &str) -> String {
    if old_status == new_status {
        return item.segment.clone();
    }
    let Some(plan) = item.handoff_plan.as_ref() else {
        return item.segment.clone();
    };

    plan.conditions
        .iter()
        .find(|condition| condition.status == new_status)
        .map_or_else(
            || plan.next_segment.clone(),
            |condition| condition.target_segment.clone(),
        )
}
