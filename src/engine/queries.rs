use ulid::Ulid;

use crate::model::*;

use super::availability::effective_availability;
use super::{Engine, EngineError};

fn matches_category_filter(cs: &CategoryState, filter: &HotelFilter) -> bool {
    if let Some(min) = filter.min_price
        && cs.price_per_night < min {
            return false;
        }
    if let Some(max) = filter.max_price
        && cs.price_per_night > max {
            return false;
        }
    if let Some(cid) = filter.category_id
        && cs.id != cid {
            return false;
        }
    if let Some(ref needle) = filter.category_name_contains
        && !cs.name.to_lowercase().contains(&needle.to_lowercase()) {
            return false;
        }
    filter
        .amenities
        .iter()
        .all(|a| cs.amenities.iter().any(|have| have == a))
}

impl Engine {
    /// Per-category remaining units for a stay at one hotel.
    pub async fn check_availability(
        &self,
        hotel_id: Ulid,
        stay: &Stay,
    ) -> Result<Vec<CategoryAvailability>, EngineError> {
        metrics::counter!(crate::observability::AVAILABILITY_QUERIES_TOTAL).increment(1);
        if !self.hotels.contains_key(&hotel_id) {
            return Err(EngineError::HotelNotFound(hotel_id));
        }

        let category_ids = self
            .hotel_categories
            .get(&hotel_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let mut rows = Vec::with_capacity(category_ids.len());
        for cid in category_ids {
            let Some(cs) = self.get_category(&cid) else { continue };
            let guard = cs.read().await;
            rows.push(CategoryAvailability {
                category_id: guard.id,
                name: guard.name.clone(),
                remaining: effective_availability(
                    guard.total_capacity,
                    &guard.bookings,
                    Some(stay),
                ),
                price_per_night: guard.price_per_night,
            });
        }
        Ok(rows)
    }

    /// Remaining units for one category. Without a stay this is the raw
    /// capacity gate used by dateless browsing.
    pub async fn category_availability(
        &self,
        category_id: Ulid,
        stay: Option<&Stay>,
    ) -> Result<u32, EngineError> {
        metrics::counter!(crate::observability::AVAILABILITY_QUERIES_TOTAL).increment(1);
        let cs = self
            .get_category(&category_id)
            .ok_or(EngineError::CategoryNotFound(category_id))?;
        let guard = cs.read().await;
        Ok(effective_availability(guard.total_capacity, &guard.bookings, stay))
    }

    /// One hotel with its categories; effective availability is computed
    /// when a stay is given, raw capacity otherwise.
    pub async fn get_hotel(
        &self,
        hotel_id: Ulid,
        stay: Option<&Stay>,
    ) -> Result<HotelListing, EngineError> {
        let hotel = self
            .hotels
            .get(&hotel_id)
            .map(|h| h.value().clone())
            .ok_or(EngineError::HotelNotFound(hotel_id))?;

        let category_ids = self
            .hotel_categories
            .get(&hotel_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let mut categories = Vec::with_capacity(category_ids.len());
        for cid in category_ids {
            let Some(cs) = self.get_category(&cid) else { continue };
            let guard = cs.read().await;
            categories.push(CategoryListing {
                category: CategoryInfo {
                    id: guard.id,
                    hotel_id: guard.hotel_id,
                    name: guard.name.clone(),
                    total_capacity: guard.total_capacity,
                    price_per_night: guard.price_per_night,
                    amenities: guard.amenities.clone(),
                },
                effective_availability: effective_availability(
                    guard.total_capacity,
                    &guard.bookings,
                    stay,
                ),
            });
        }
        Ok(HotelListing { hotel, categories })
    }

    /// Search hotels. A hotel is listed when at least one of its categories
    /// passes the price/amenity filters and has availability: effective
    /// availability > 0 when the filter carries a stay, raw capacity > 0
    /// otherwise. Only those categories are returned with the hotel.
    pub async fn list_hotels(&self, filter: &HotelFilter) -> Vec<HotelListing> {
        let mut listings = Vec::new();

        let hotels: Vec<Hotel> = self.hotels.iter().map(|e| e.value().clone()).collect();
        for hotel in hotels {
            if let Some(ref city) = filter.city
                && hotel.city != *city {
                    continue;
                }
            if let Some(ref needle) = filter.name_contains
                && !hotel.name.to_lowercase().contains(&needle.to_lowercase()) {
                    continue;
                }
            if let Some(stars) = filter.star_rating
                && hotel.star_rating != Some(stars) {
                    continue;
                }

            let category_ids = self
                .hotel_categories
                .get(&hotel.id)
                .map(|e| e.value().clone())
                .unwrap_or_default();

            let mut categories = Vec::new();
            for cid in category_ids {
                let Some(cs) = self.get_category(&cid) else { continue };
                let guard = cs.read().await;
                if !matches_category_filter(&guard, filter) {
                    continue;
                }
                let remaining = effective_availability(
                    guard.total_capacity,
                    &guard.bookings,
                    filter.stay.as_ref(),
                );
                if remaining == 0 {
                    continue;
                }
                categories.push(CategoryListing {
                    category: CategoryInfo {
                        id: guard.id,
                        hotel_id: guard.hotel_id,
                        name: guard.name.clone(),
                        total_capacity: guard.total_capacity,
                        price_per_night: guard.price_per_night,
                        amenities: guard.amenities.clone(),
                    },
                    effective_availability: remaining,
                });
            }

            if !categories.is_empty() {
                listings.push(HotelListing { hotel, categories });
            }
        }
        listings
    }

    /// Bookings across a hotel, newest first. The optional range keeps
    /// only bookings whose stay overlaps it (half-open, like everywhere
    /// else).
    pub async fn list_bookings(
        &self,
        hotel_id: Ulid,
        filter: &BookingFilter,
    ) -> Result<Vec<BookingRecord>, EngineError> {
        if !self.hotels.contains_key(&hotel_id) {
            return Err(EngineError::HotelNotFound(hotel_id));
        }

        let category_ids: Vec<Ulid> = match filter.category_id {
            Some(cid) => {
                let cs = self
                    .get_category(&cid)
                    .ok_or(EngineError::CategoryNotFound(cid))?;
                if cs.read().await.hotel_id != hotel_id {
                    return Err(EngineError::CategoryNotFound(cid));
                }
                vec![cid]
            }
            None => self
                .hotel_categories
                .get(&hotel_id)
                .map(|e| e.value().clone())
                .unwrap_or_default(),
        };

        let mut records = Vec::new();
        for cid in category_ids {
            let Some(cs) = self.get_category(&cid) else { continue };
            let guard = cs.read().await;
            for b in &guard.bookings {
                if let Some(ref range) = filter.range
                    && !b.stay.overlaps(range) {
                        continue;
                    }
                records.push(BookingRecord {
                    id: b.id,
                    category_id: cid,
                    guest_id: b.guest_id,
                    stay: b.stay,
                    status: b.status,
                    created_at: b.created_at,
                });
            }
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<BookingRecord, EngineError> {
        let category_id = self
            .category_for_booking(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        let cs = self
            .get_category(&category_id)
            .ok_or(EngineError::CategoryNotFound(category_id))?;
        let guard = cs.read().await;
        let b = guard.booking(id).ok_or(EngineError::BookingNotFound(id))?;
        Ok(BookingRecord {
            id: b.id,
            category_id,
            guest_id: b.guest_id,
            stay: b.stay,
            status: b.status,
            created_at: b.created_at,
        })
    }
}
