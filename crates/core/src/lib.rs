//! Box Office Core Library
//!
//! Reservation and inventory core: time-boxed holds on seats or general
//! admission capacity, ticket issuance on confirmation, expiry, and the
//! SQLite storage underneath.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod holds;
pub mod invariants;
pub mod issuer;
pub mod ledger;
mod locks;
pub mod models;
pub mod office;
pub mod storage;
pub mod sweeper;

pub use catalog::Catalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ReservationConfig;
pub use error::{Error, Result};
pub use holds::HoldManager;
pub use invariants::{audit_event, InventoryAudit};
pub use issuer::TicketIssuer;
pub use ledger::Availability;
pub use models::*;
pub use office::BoxOffice;
pub use storage::Database;
pub use sweeper::{sweep_once, Sweeper};
