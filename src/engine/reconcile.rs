use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

// ── Capacity-Reduction Reconciliation ─────────────────────────────

/// Confirmed bookings with a check-in strictly after `today`. Only these
/// are candidates for cancellation when capacity shrinks; stays already in
/// progress or in the past are never touched.
pub fn active_future(bookings: &[Booking], today: NaiveDate) -> Vec<&Booking> {
    bookings
        .iter()
        .filter(|b| b.is_confirmed() && b.stay.check_in > today)
        .collect()
}

/// Pick which bookings must be cancelled so that confirmed future demand
/// fits within `new_capacity`.
///
/// Most-recently-created bookings go first: earliest bookers keep their
/// rooms (first-come-first-served survivors). Ties on `created_at` fall
/// back to id, newest first, so the selection is deterministic. The
/// returned ids are in cancellation order.
pub fn select_cancellations(
    bookings: &[Booking],
    new_capacity: u32,
    today: NaiveDate,
) -> Vec<Ulid> {
    let mut active = active_future(bookings, today);
    let excess = active.len().saturating_sub(new_capacity as usize);
    if excess == 0 {
        return Vec::new();
    }

    active.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    active.truncate(excess);
    active.into_iter().map(|b| b.id).collect()
}
