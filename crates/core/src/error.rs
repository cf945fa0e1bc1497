//! Error types for the reservation core

use thiserror::Error;
use uuid::Uuid;

use crate::models::HoldStatus;

#[derive(Error, Debug)]
pub enum Error {
    /// Infrastructure failure during a read or an atomic commit.
    /// Nothing was partially applied; the operation may be retried.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Event {0} has already started")]
    EventStarted(Uuid),

    #[error("Event {0} has sold tickets and can no longer be changed")]
    EventLocked(Uuid),

    #[error("Seat not found: {0}")]
    SeatNotFound(Uuid),

    #[error("Seat {0} is not available")]
    SeatUnavailable(Uuid),

    #[error("Capacity exceeded: requested {requested}, remaining {remaining}")]
    CapacityExceeded { requested: u32, remaining: u32 },

    #[error("Hold not found: {0}")]
    HoldNotFound(Uuid),

    #[error("Hold {hold_id} is already {status}")]
    AlreadyFinalized { hold_id: Uuid, status: HoldStatus },

    #[error("Hold {0} has expired")]
    Expired(Uuid),

    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    #[error("Ticket {0} has already been used")]
    TicketAlreadyUsed(Uuid),

    #[error("Invalid seat selection: {0}")]
    InvalidSelection(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Ledger inconsistency: {0}")]
    Ledger(String),

    #[error("Could not generate a unique ticket code after {0} attempts")]
    CodeSpaceExhausted(u32),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Contention on inventory: expected under load, retry with other seats
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Error::SeatUnavailable(_) | Error::CapacityExceeded { .. }
        )
    }

    /// Whether repeating the exact same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Persistence(_) | Error::CodeSpaceExhausted(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
