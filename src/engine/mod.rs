mod availability;
mod error;
mod mutations;
mod queries;
mod reconcile;

pub use availability::{
    count_overlapping_confirmed, effective_availability, has_vacancy, validate_stay,
};
pub use error::EngineError;
pub use reconcile::{active_future, select_cancellations};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::{NotifyHub, Scope};
use crate::wal::Wal;

pub type SharedCategoryState = Arc<RwLock<CategoryState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The availability engine: all hotels, room categories, and bookings,
/// in memory, durably backed by an append-only WAL.
///
/// Each category lives behind its own `RwLock`; holding the write lock
/// across read-check-write is what keeps the "confirmed overlapping
/// bookings ≤ capacity" invariant safe under concurrent callers. Work on
/// different categories never contends.
pub struct Engine {
    pub(super) categories: DashMap<Ulid, SharedCategoryState>,
    pub(super) hotels: DashMap<Ulid, Hotel>,
    /// Hotel → category ids, for per-hotel listing and cascade deletion.
    pub(super) hotel_categories: DashMap<Ulid, Vec<Ulid>>,
    /// Reverse lookup: booking id → category id.
    pub(super) booking_index: DashMap<Ulid, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

/// Apply a category-scoped event directly to a CategoryState (no locking —
/// caller holds the lock).
fn apply_to_category(rs: &mut CategoryState, event: &Event, booking_index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::CategoryUpdated {
            name,
            total_capacity,
            price_per_night,
            amenities,
            ..
        } => {
            rs.name = name.clone();
            rs.total_capacity = *total_capacity;
            rs.price_per_night = *price_per_night;
            rs.amenities = amenities.clone();
        }
        Event::BookingCreated {
            id,
            category_id,
            guest_id,
            stay,
            created_at,
        } => {
            rs.insert_booking(Booking {
                id: *id,
                guest_id: *guest_id,
                stay: *stay,
                status: BookingStatus::Confirmed,
                created_at: *created_at,
            });
            booking_index.insert(*id, *category_id);
        }
        Event::BookingCancelled { id, .. } => {
            // The record stays; only the status flips. Cancelled bookings
            // are immutable history, not deletions.
            if let Some(b) = rs.booking_mut(*id) {
                b.status = BookingStatus::Cancelled;
            }
        }
        // Hotel and category create/delete are handled at the map level.
        _ => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            categories: DashMap::new(),
            hotels: DashMap::new(),
            hotel_categories: DashMap::new(),
            booking_index: DashMap::new(),
            wal_tx,
            notify,
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::HotelCreated {
                    id,
                    name,
                    city,
                    star_rating,
                } => {
                    engine.hotels.insert(
                        *id,
                        Hotel {
                            id: *id,
                            name: name.clone(),
                            city: city.clone(),
                            star_rating: *star_rating,
                        },
                    );
                    engine.hotel_categories.entry(*id).or_default();
                }
                Event::HotelUpdated {
                    id,
                    name,
                    city,
                    star_rating,
                } => {
                    if let Some(mut h) = engine.hotels.get_mut(id) {
                        h.name = name.clone();
                        h.city = city.clone();
                        h.star_rating = *star_rating;
                    }
                }
                Event::HotelDeleted { id } => {
                    engine.hotels.remove(id);
                    if let Some((_, category_ids)) = engine.hotel_categories.remove(id) {
                        for cid in category_ids {
                            if let Some((_, cs)) = engine.categories.remove(&cid) {
                                let guard = cs.try_read().expect("replay: uncontended read");
                                for b in &guard.bookings {
                                    engine.booking_index.remove(&b.id);
                                }
                            }
                        }
                    }
                }
                Event::CategoryCreated {
                    id,
                    hotel_id,
                    name,
                    total_capacity,
                    price_per_night,
                    amenities,
                } => {
                    let cs = CategoryState::new(
                        *id,
                        *hotel_id,
                        name.clone(),
                        *total_capacity,
                        *price_per_night,
                        amenities.clone(),
                    );
                    engine.categories.insert(*id, Arc::new(RwLock::new(cs)));
                    engine.hotel_categories.entry(*hotel_id).or_default().push(*id);
                }
                Event::CategoryDeleted { id } => {
                    if let Some((_, cs)) = engine.categories.remove(id) {
                        let guard = cs.try_read().expect("replay: uncontended read");
                        engine.unindex_category(&guard);
                    }
                }
                other => {
                    if let Some(category_id) = event_category_id(other)
                        && let Some(entry) = engine.categories.get(&category_id) {
                            let cs_arc = entry.clone();
                            let mut guard = cs_arc.try_write().expect("replay: uncontended write");
                            apply_to_category(&mut guard, other, &engine.booking_index);
                        }
                }
            }
        }

        Ok(engine)
    }

    /// Empty engine wired to an arbitrary WAL channel, so tests can stand
    /// in a writer that fails on demand.
    #[cfg(test)]
    pub(super) fn with_wal_channel(wal_tx: mpsc::Sender<WalCommand>, notify: Arc<NotifyHub>) -> Self {
        Self {
            categories: DashMap::new(),
            hotels: DashMap::new(),
            hotel_categories: DashMap::new(),
            booking_index: DashMap::new(),
            wal_tx,
            notify,
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))
    }

    pub fn get_category(&self, id: &Ulid) -> Option<SharedCategoryState> {
        self.categories.get(id).map(|e| e.value().clone())
    }

    pub fn category_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_index.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call.
    pub(super) async fn persist_and_apply(
        &self,
        category_id: Ulid,
        cs: &mut CategoryState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_category(cs, event, &self.booking_index);
        self.notify.send(Scope::Category(category_id), event);
        Ok(())
    }

    /// Lookup booking → category, get category, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<CategoryState>), EngineError> {
        let category_id = self
            .category_for_booking(booking_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        let cs = self
            .get_category(&category_id)
            .ok_or(EngineError::CategoryNotFound(category_id))?;
        let guard = cs.write_owned().await;
        Ok((category_id, guard))
    }

    /// Drop a category's booking-index entries and its slot in the
    /// per-hotel index. The caller holds (or exclusively owns) the
    /// category's lock and removes it from `categories` itself.
    pub(super) fn unindex_category(&self, cs: &CategoryState) {
        for b in &cs.bookings {
            self.booking_index.remove(&b.id);
        }
        if let Some(mut kids) = self.hotel_categories.get_mut(&cs.hotel_id) {
            kids.retain(|c| *c != cs.id);
        }
    }
}

/// Extract the category id from a category-scoped event.
fn event_category_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingCreated { category_id, .. }
        | Event::BookingCancelled { category_id, .. } => Some(*category_id),
        Event::CategoryUpdated { id, .. } => Some(*id),
        _ => None,
    }
}
