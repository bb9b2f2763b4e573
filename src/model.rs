use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Half-open date range `[check_in, check_out)` at day granularity.
/// The check-out day itself is not occupied, so a stay ending on a given
/// day and another starting that same day do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self { check_in, check_out }
    }

    /// Parse a stay from `YYYY-MM-DD` strings as supplied by calling
    /// workflows.
    pub fn parse(check_in: &str, check_out: &str) -> Result<Self, EngineError> {
        let check_in = check_in
            .parse::<NaiveDate>()
            .map_err(|_| EngineError::InvalidDate(check_in.to_string()))?;
        let check_out = check_out
            .parse::<NaiveDate>()
            .map_err(|_| EngineError::InvalidDate(check_out.to_string()))?;
        Ok(Self { check_in, check_out })
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Two half-open ranges overlap iff each starts before the other ends.
    /// A zero-length stay overlaps nothing.
    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.check_in <= day && day < self.check_out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

/// Why a booking was cancelled. Capacity-reduction cancellations are the
/// ones the caller must forward to its notification collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    Guest,
    CapacityReduced,
}

/// One reservation against a room category's shared pool. Cancelled
/// bookings are kept as immutable records; they never return to Confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub guest_id: Ulid,
    pub stay: Stay,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

/// A bookable class of room within a hotel: a single interchangeable pool
/// of `total_capacity` identical units at one nightly price.
#[derive(Debug, Clone)]
pub struct CategoryState {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub name: String,
    pub total_capacity: u32,
    /// Nightly price in minor currency units.
    pub price_per_night: i64,
    pub amenities: Vec<String>,
    /// All bookings, confirmed and cancelled, sorted by `stay.check_in`.
    pub bookings: Vec<Booking>,
}

impl CategoryState {
    pub fn new(
        id: Ulid,
        hotel_id: Ulid,
        name: String,
        total_capacity: u32,
        price_per_night: i64,
        amenities: Vec<String>,
    ) -> Self {
        Self {
            id,
            hotel_id,
            name,
            total_capacity,
            price_per_night,
            amenities,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by check-in date.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.stay.check_in, |b| b.stay.check_in)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose stay overlaps the query range, regardless of status.
    /// Uses binary search to skip bookings checking in at or after
    /// `query.check_out`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound checks in at or after the
        // query's check-out → can't overlap.
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in < query.check_out);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out > query.check_in)
    }
}

/// Hotel metadata. Categories belong to exactly one hotel and are
/// cascade-deleted with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: Ulid,
    pub name: String,
    pub city: String,
    pub star_rating: Option<u8>,
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    HotelCreated {
        id: Ulid,
        name: String,
        city: String,
        star_rating: Option<u8>,
    },
    HotelUpdated {
        id: Ulid,
        name: String,
        city: String,
        star_rating: Option<u8>,
    },
    HotelDeleted {
        id: Ulid,
    },
    CategoryCreated {
        id: Ulid,
        hotel_id: Ulid,
        name: String,
        total_capacity: u32,
        price_per_night: i64,
        amenities: Vec<String>,
    },
    CategoryUpdated {
        id: Ulid,
        name: String,
        total_capacity: u32,
        price_per_night: i64,
        amenities: Vec<String>,
    },
    CategoryDeleted {
        id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        category_id: Ulid,
        guest_id: Ulid,
        stay: Stay,
        created_at: DateTime<Utc>,
    },
    BookingCancelled {
        id: Ulid,
        category_id: Ulid,
        reason: CancelReason,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryInfo {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub name: String,
    pub total_capacity: u32,
    pub price_per_night: i64,
    pub amenities: Vec<String>,
}

/// One row of a per-hotel availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryAvailability {
    pub category_id: Ulid,
    pub name: String,
    pub remaining: u32,
    pub price_per_night: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryListing {
    pub category: CategoryInfo,
    pub effective_availability: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotelListing {
    pub hotel: Hotel,
    pub categories: Vec<CategoryListing>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRecord {
    pub id: Ulid,
    pub category_id: Ulid,
    pub guest_id: Ulid,
    pub stay: Stay,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

/// Listing/search filters. All fields optional; `Default` is "everything".
#[derive(Debug, Clone, Default)]
pub struct HotelFilter {
    /// Exact city match.
    pub city: Option<String>,
    /// Case-insensitive substring match on the hotel name.
    pub name_contains: Option<String>,
    pub star_rating: Option<u8>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    /// Restrict to one specific room category.
    pub category_id: Option<Ulid>,
    /// Case-insensitive substring match on the category name.
    pub category_name_contains: Option<String>,
    /// Categories must carry every listed amenity.
    pub amenities: Vec<String>,
    /// With a stay: categories shown with effective availability > 0.
    /// Without: categories shown when raw capacity > 0.
    pub stay: Option<Stay>,
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub category_id: Option<Ulid>,
    /// Only bookings whose stay overlaps this range.
    pub range: Option<Stay>,
}
