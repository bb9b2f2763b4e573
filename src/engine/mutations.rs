use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::{RwLock, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::Scope;

use super::availability::{has_vacancy, validate_stay};
use super::reconcile::select_cancellations;
use super::{Engine, EngineError, WalCommand};

fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

fn validate_amenities(amenities: &[String]) -> Result<(), EngineError> {
    if amenities.len() > MAX_AMENITIES {
        return Err(EngineError::LimitExceeded("too many amenities"));
    }
    if amenities.iter().any(|a| a.len() > MAX_AMENITY_LEN) {
        return Err(EngineError::LimitExceeded("amenity name too long"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_hotel(
        &self,
        id: Ulid,
        name: String,
        city: String,
        star_rating: Option<u8>,
    ) -> Result<(), EngineError> {
        if self.hotels.len() >= MAX_HOTELS {
            return Err(EngineError::LimitExceeded("too many hotels"));
        }
        validate_name(&name)?;
        if city.len() > MAX_CITY_LEN {
            return Err(EngineError::LimitExceeded("city name too long"));
        }
        if let Some(s) = star_rating
            && !(1..=5).contains(&s) {
                return Err(EngineError::LimitExceeded("star rating out of range"));
            }
        if self.hotels.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::HotelCreated {
            id,
            name: name.clone(),
            city: city.clone(),
            star_rating,
        };
        self.wal_append(&event).await?;
        self.hotels.insert(id, Hotel { id, name, city, star_rating });
        self.hotel_categories.entry(id).or_default();
        self.notify.send(Scope::Hotel(id), &event);
        Ok(())
    }

    /// Partial update: `None` fields keep their current value.
    pub async fn update_hotel(
        &self,
        id: Ulid,
        name: Option<String>,
        city: Option<String>,
        star_rating: Option<u8>,
    ) -> Result<(), EngineError> {
        let current = self
            .hotels
            .get(&id)
            .map(|h| h.value().clone())
            .ok_or(EngineError::HotelNotFound(id))?;

        let name = name.unwrap_or(current.name);
        let city = city.unwrap_or(current.city);
        let star_rating = star_rating.or(current.star_rating);
        validate_name(&name)?;
        if city.len() > MAX_CITY_LEN {
            return Err(EngineError::LimitExceeded("city name too long"));
        }
        if let Some(s) = star_rating
            && !(1..=5).contains(&s) {
                return Err(EngineError::LimitExceeded("star rating out of range"));
            }

        let event = Event::HotelUpdated {
            id,
            name: name.clone(),
            city: city.clone(),
            star_rating,
        };
        self.wal_append(&event).await?;
        if let Some(mut h) = self.hotels.get_mut(&id) {
            h.name = name;
            h.city = city;
            h.star_rating = star_rating;
        }
        self.notify.send(Scope::Hotel(id), &event);
        Ok(())
    }

    /// Delete a hotel and cascade-delete its categories and their bookings.
    pub async fn delete_hotel(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.hotels.contains_key(&id) {
            return Err(EngineError::HotelNotFound(id));
        }

        let event = Event::HotelDeleted { id };
        self.wal_append(&event).await?;

        self.hotels.remove(&id);
        if let Some((_, category_ids)) = self.hotel_categories.remove(&id) {
            for cid in category_ids {
                if let Some(cs) = self.get_category(&cid) {
                    let guard = cs.read().await;
                    for b in &guard.bookings {
                        self.booking_index.remove(&b.id);
                    }
                    drop(guard);
                    self.categories.remove(&cid);
                }
                self.notify.remove(&Scope::Category(cid));
            }
        }
        self.notify.send(Scope::Hotel(id), &event);
        self.notify.remove(&Scope::Hotel(id));
        Ok(())
    }

    pub async fn create_category(
        &self,
        id: Ulid,
        hotel_id: Ulid,
        name: String,
        total_capacity: u32,
        price_per_night: i64,
        amenities: Vec<String>,
    ) -> Result<(), EngineError> {
        if !self.hotels.contains_key(&hotel_id) {
            return Err(EngineError::HotelNotFound(hotel_id));
        }
        if self.categories.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self
            .hotel_categories
            .get(&hotel_id)
            .is_some_and(|kids| kids.len() >= MAX_CATEGORIES_PER_HOTEL)
        {
            return Err(EngineError::LimitExceeded("too many categories on hotel"));
        }
        validate_name(&name)?;
        validate_amenities(&amenities)?;
        if total_capacity > MAX_TOTAL_CAPACITY {
            return Err(EngineError::InvalidCapacity(total_capacity));
        }
        if price_per_night < 0 {
            return Err(EngineError::LimitExceeded("negative price"));
        }

        let event = Event::CategoryCreated {
            id,
            hotel_id,
            name: name.clone(),
            total_capacity,
            price_per_night,
            amenities: amenities.clone(),
        };
        self.wal_append(&event).await?;
        let cs = CategoryState::new(id, hotel_id, name, total_capacity, price_per_night, amenities);
        self.categories.insert(id, Arc::new(RwLock::new(cs)));
        self.hotel_categories.entry(hotel_id).or_default().push(id);
        self.notify.send(Scope::Category(id), &event);
        Ok(())
    }

    /// Update a room category; `None` fields keep their current value.
    ///
    /// When the resolved capacity is below confirmed future demand, the
    /// excess bookings are cancelled before the capacity change is
    /// persisted: most-recently-created first, so earliest bookers keep
    /// their rooms. Bookings already in progress (check-in ≤ `today`) are
    /// never touched. Returns the cancelled booking ids in cancellation
    /// order; the caller forwards each to its notification collaborator.
    ///
    /// Cancellations are persisted one WAL record at a time. If any append
    /// fails after the first cancellation landed — mid-pass or on the final
    /// capacity record — the error carries the ids persisted so far; that
    /// partial list is the authoritative record of what happened.
    pub async fn update_category(
        &self,
        id: Ulid,
        name: Option<String>,
        total_capacity: Option<u32>,
        price_per_night: Option<i64>,
        amenities: Option<Vec<String>>,
        today: NaiveDate,
    ) -> Result<Vec<Ulid>, EngineError> {
        let cs = self
            .get_category(&id)
            .ok_or(EngineError::CategoryNotFound(id))?;
        let mut guard = cs.write().await;

        let name = name.unwrap_or_else(|| guard.name.clone());
        let total_capacity = total_capacity.unwrap_or(guard.total_capacity);
        let price_per_night = price_per_night.unwrap_or(guard.price_per_night);
        let amenities = amenities.unwrap_or_else(|| guard.amenities.clone());
        validate_name(&name)?;
        validate_amenities(&amenities)?;
        if total_capacity > MAX_TOTAL_CAPACITY {
            return Err(EngineError::InvalidCapacity(total_capacity));
        }
        if price_per_night < 0 {
            return Err(EngineError::LimitExceeded("negative price"));
        }

        let to_cancel = select_cancellations(&guard.bookings, total_capacity, today);
        metrics::counter!(crate::observability::RECONCILE_RUNS_TOTAL).increment(1);

        let mut cancelled: Vec<Ulid> = Vec::with_capacity(to_cancel.len());
        if !to_cancel.is_empty() {
            info!(
                category = %id,
                new_capacity = total_capacity,
                excess = to_cancel.len(),
                "capacity reduced below active demand, cancelling excess bookings"
            );
        }
        for booking_id in to_cancel {
            let event = Event::BookingCancelled {
                id: booking_id,
                category_id: id,
                reason: CancelReason::CapacityReduced,
            };
            if let Err(e) = self.persist_and_apply(id, &mut guard, &event).await {
                return Err(EngineError::ReconcileInterrupted {
                    cancelled,
                    cause: e.to_string(),
                });
            }
            metrics::counter!(
                crate::observability::BOOKINGS_CANCELLED_TOTAL,
                "reason" => "capacity_reduced"
            )
            .increment(1);
            cancelled.push(booking_id);
        }
        metrics::counter!(crate::observability::RECONCILE_CANCELLATIONS_TOTAL)
            .increment(cancelled.len() as u64);

        let event = Event::CategoryUpdated {
            id,
            name,
            total_capacity,
            price_per_night,
            amenities,
        };
        if let Err(e) = self.persist_and_apply(id, &mut guard, &event).await {
            if cancelled.is_empty() {
                return Err(e);
            }
            // Subscribers already heard these cancellations; the caller
            // must hear them too.
            return Err(EngineError::ReconcileInterrupted {
                cancelled,
                cause: e.to_string(),
            });
        }
        Ok(cancelled)
    }

    pub async fn delete_category(&self, id: Ulid) -> Result<(), EngineError> {
        let cs = self
            .get_category(&id)
            .ok_or(EngineError::CategoryNotFound(id))?;
        let guard = cs.write_owned().await;

        let event = Event::CategoryDeleted { id };
        self.wal_append(&event).await?;
        self.unindex_category(&guard);
        drop(guard);
        self.categories.remove(&id);
        self.notify.send(Scope::Category(id), &event);
        self.notify.remove(&Scope::Category(id));
        Ok(())
    }

    /// Create a confirmed booking against a category's pool.
    ///
    /// The availability re-check and the insert happen under the same
    /// category write lock, so two concurrent callers cannot both take the
    /// last unit.
    pub async fn create_booking(
        &self,
        id: Ulid,
        category_id: Ulid,
        guest_id: Ulid,
        stay: Stay,
        created_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        validate_stay(&stay)?;
        if self.booking_index.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let cs = self
            .get_category(&category_id)
            .ok_or(EngineError::CategoryNotFound(category_id))?;
        let mut guard = cs.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_CATEGORY {
            return Err(EngineError::LimitExceeded("too many bookings on category"));
        }

        if !has_vacancy(guard.total_capacity, &guard.bookings, &stay) {
            return Err(EngineError::NoVacancy(category_id));
        }

        let event = Event::BookingCreated {
            id,
            category_id,
            guest_id,
            stay,
            created_at,
        };
        self.persist_and_apply(category_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        Ok(())
    }

    /// Guest-initiated cancellation. Returns the owning category id.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (category_id, mut guard) = self.resolve_booking_write(&id).await?;
        match guard.booking(id) {
            None => return Err(EngineError::BookingNotFound(id)),
            Some(b) if !b.is_confirmed() => return Err(EngineError::AlreadyCancelled(id)),
            Some(_) => {}
        }

        let event = Event::BookingCancelled {
            id,
            category_id,
            reason: CancelReason::Guest,
        };
        self.persist_and_apply(category_id, &mut guard, &event).await?;
        metrics::counter!(
            crate::observability::BOOKINGS_CANCELLED_TOTAL,
            "reason" => "guest"
        )
        .increment(1);
        Ok(category_id)
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state. Cancelled bookings survive compaction:
    /// they are immutable records, re-emitted as create + cancel pairs.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for entry in self.hotels.iter() {
            let h = entry.value();
            events.push(Event::HotelCreated {
                id: h.id,
                name: h.name.clone(),
                city: h.city.clone(),
                star_rating: h.star_rating,
            });
        }

        let category_ids: Vec<Ulid> = self.categories.iter().map(|e| *e.key()).collect();
        for cid in category_ids {
            let Some(cs) = self.get_category(&cid) else { continue };
            let guard = cs.read().await;
            events.push(Event::CategoryCreated {
                id: guard.id,
                hotel_id: guard.hotel_id,
                name: guard.name.clone(),
                total_capacity: guard.total_capacity,
                price_per_night: guard.price_per_night,
                amenities: guard.amenities.clone(),
            });
            for b in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: b.id,
                    category_id: guard.id,
                    guest_id: b.guest_id,
                    stay: b.stay,
                    created_at: b.created_at,
                });
                if !b.is_confirmed() {
                    events.push(Event::BookingCancelled {
                        id: b.id,
                        category_id: guard.id,
                        reason: CancelReason::Guest,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
