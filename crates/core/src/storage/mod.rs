//! SQLite storage layer for the reservation core
//!
//! Stores borrow a `Connection`; a `Transaction` derefs to one, so the same
//! stores serve both plain reads and atomic multi-row commits.

mod capacity;
mod events;
mod holds;
mod migrations;
mod parse;
mod seats;
mod tickets;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use tracing::instrument;

use crate::error::Result;

pub use capacity::CapacityStore;
pub use events::EventStore;
pub use holds::HoldStore;
pub use seats::SeatStore;
pub use tickets::TicketStore;

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<u32> {
        migrations::get_current_version(&self.conn)
    }

    /// Underlying connection for reads outside a transaction
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin an atomic unit of work.
    ///
    /// Takes the write lock up front, so a check-then-set inside the
    /// transaction cannot interleave with another writer. Dropping the
    /// transaction without committing rolls everything back.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    /// Get event store
    pub fn events(&self) -> EventStore<'_> {
        EventStore::new(&self.conn)
    }

    /// Get seat ledger store
    pub fn seats(&self) -> SeatStore<'_> {
        SeatStore::new(&self.conn)
    }

    /// Get capacity counter store
    pub fn capacity(&self) -> CapacityStore<'_> {
        CapacityStore::new(&self.conn)
    }

    /// Get hold store
    pub fn holds(&self) -> HoldStore<'_> {
        HoldStore::new(&self.conn)
    }

    /// Get ticket store
    pub fn tickets(&self) -> TicketStore<'_> {
        TicketStore::new(&self.conn)
    }
}
