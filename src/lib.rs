//! Hotel room-availability and booking engine.
//!
//! Calling workflows (booking creation, listing/search, room-category
//! administration) embed the [`engine::Engine`] in-process. State lives in
//! memory behind per-category locks and is durably backed by an
//! append-only WAL replayed at startup.

pub mod engine;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;

pub use engine::{Engine, EngineError};
pub use model::{Booking, BookingStatus, CancelReason, Hotel, Stay};
