use chrono::NaiveDate;
use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    HotelNotFound(Ulid),
    CategoryNotFound(Ulid),
    BookingNotFound(Ulid),
    AlreadyExists(Ulid),
    /// Cancelled bookings are immutable; cancelling one again is an error.
    AlreadyCancelled(Ulid),
    /// No unit of the category's pool is free for the requested stay.
    NoVacancy(Ulid),
    InvalidDate(String),
    InvalidStay {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    InvalidCapacity(u32),
    LimitExceeded(&'static str),
    Wal(String),
    /// A WAL append failed partway through a capacity-reduction pass.
    /// `cancelled` is the authoritative record of what was persisted before
    /// the failure; callers must re-query actual state.
    ReconcileInterrupted {
        cancelled: Vec<Ulid>,
        cause: String,
    },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::HotelNotFound(id) => write!(f, "hotel not found: {id}"),
            EngineError::CategoryNotFound(id) => write!(f, "room category not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::AlreadyCancelled(id) => write!(f, "booking already cancelled: {id}"),
            EngineError::NoVacancy(id) => {
                write!(f, "no vacancy in category {id} for the requested stay")
            }
            EngineError::InvalidDate(s) => write!(f, "unparsable date: {s:?}"),
            EngineError::InvalidStay { check_in, check_out } => {
                write!(f, "invalid stay: check-in {check_in} not before check-out {check_out}")
            }
            EngineError::InvalidCapacity(cap) => write!(f, "invalid capacity: {cap}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Wal(e) => write!(f, "WAL error: {e}"),
            EngineError::ReconcileInterrupted { cancelled, cause } => {
                write!(
                    f,
                    "reconciliation interrupted after {} cancellation(s): {cause}",
                    cancelled.len()
                )
            }
        }
    }
}

impl std::error::Error for EngineError {}
