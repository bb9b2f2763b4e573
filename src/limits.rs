//! Hard caps on stored state. Every mutation checks the relevant limit
//! before appending to the WAL, so a misbehaving caller cannot grow a
//! category's booking list (and with it, every availability scan) without
//! bound.

pub const MAX_HOTELS: usize = 10_000;
pub const MAX_CATEGORIES_PER_HOTEL: usize = 256;
pub const MAX_BOOKINGS_PER_CATEGORY: usize = 100_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_CITY_LEN: usize = 128;
pub const MAX_AMENITIES: usize = 64;
pub const MAX_AMENITY_LEN: usize = 64;

/// Longest bookable stay, in nights.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Accepted calendar window for check-in/check-out dates.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2200;

pub const MAX_TOTAL_CAPACITY: u32 = 10_000;
