use chrono::Datelike;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

// ── Effective Availability ────────────────────────────────────────

/// Number of confirmed bookings whose stay overlaps `query`.
///
/// Counter model: every confirmed overlapping booking consumes exactly one
/// unit of the category's shared pool. This is correct because a category's
/// capacity represents interchangeable identical units, not numbered rooms.
pub fn count_overlapping_confirmed(bookings: &[Booking], query: &Stay) -> u32 {
    bookings
        .iter()
        .filter(|b| b.is_confirmed() && b.stay.overlaps(query))
        .count() as u32
}

/// Remaining bookable units of a category for a stay.
///
/// With a query range: capacity minus confirmed overlapping bookings,
/// clamped at zero (an overbooked category reports 0, never negative).
/// Without one (dateless browsing), raw capacity is reported with no
/// overlap filtering.
pub fn effective_availability(
    total_capacity: u32,
    bookings: &[Booking],
    query: Option<&Stay>,
) -> u32 {
    match query {
        Some(stay) => {
            total_capacity.saturating_sub(count_overlapping_confirmed(bookings, stay))
        }
        None => total_capacity,
    }
}

/// Booking-creation gate: at least one unit free for the whole stay.
pub fn has_vacancy(total_capacity: u32, bookings: &[Booking], stay: &Stay) -> bool {
    effective_availability(total_capacity, bookings, Some(stay)) > 0
}

/// Reject stays that are degenerate, too long, or outside the accepted
/// calendar window before they reach the WAL.
pub fn validate_stay(stay: &Stay) -> Result<(), EngineError> {
    if stay.check_in >= stay.check_out {
        return Err(EngineError::InvalidStay {
            check_in: stay.check_in,
            check_out: stay.check_out,
        });
    }
    if stay.check_in.year() < MIN_VALID_YEAR || stay.check_out.year() > MAX_VALID_YEAR {
        return Err(EngineError::LimitExceeded("stay outside valid date window"));
    }
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}
