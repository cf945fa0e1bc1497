//! The box office handle shared by request handlers and the sweeper

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::clock::{Clock, SystemClock};
use crate::config::ReservationConfig;
use crate::error::{Error, Result};
use crate::holds::HoldManager;
use crate::invariants::{audit_event, InventoryAudit};
use crate::issuer::TicketIssuer;
use crate::locks::EventLocks;
use crate::storage::Database;

pub(crate) struct Shared {
    db: Mutex<Database>,
    locks: EventLocks,
    clock: Arc<dyn Clock>,
    pub(crate) config: ReservationConfig,
}

impl Shared {
    /// Take the connection. A panic in another caller rolled its
    /// transaction back on unwind, so a poisoned guard is still usable.
    pub(crate) fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `f` with the event's lock held, then the connection.
    ///
    /// `now` is read after both are acquired.
    pub(crate) fn with_event_lock<T>(
        &self,
        event_id: Uuid,
        f: impl FnOnce(&mut Database, DateTime<Utc>) -> Result<T>,
    ) -> Result<T> {
        let lock = self.locks.lock_for(event_id);
        let result = {
            let _event = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut db = self.db();
            let now = self.now();
            f(&mut db, now)
        };
        self.locks.release(event_id, lock);
        result
    }

    /// Event a hold belongs to, read without any event lock
    pub(crate) fn hold_event(&self, hold_id: Uuid) -> Result<Uuid> {
        self.db()
            .holds()
            .find_by_id(hold_id)?
            .map(|hold| hold.event_id)
            .ok_or(Error::HoldNotFound(hold_id))
    }

    /// Event a ticket belongs to, read without any event lock
    pub(crate) fn ticket_event(&self, ticket_id: Uuid) -> Result<Uuid> {
        self.db()
            .tickets()
            .find_by_id(ticket_id)?
            .map(|ticket| ticket.event_id)
            .ok_or_else(|| Error::TicketNotFound(ticket_id.to_string()))
    }
}

/// Entry point to the reservation core.
///
/// Cheap to clone; all clones share one database, one lock registry and
/// one clock.
#[derive(Clone)]
pub struct BoxOffice {
    shared: Arc<Shared>,
}

impl BoxOffice {
    pub fn new(db: Database, config: ReservationConfig) -> Result<Self> {
        Self::with_clock(db, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        db: Database,
        config: ReservationConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                db: Mutex::new(db),
                locks: EventLocks::default(),
                clock,
                config,
            }),
        })
    }

    /// Hold lifecycle and availability
    pub fn holds(&self) -> HoldManager<'_> {
        HoldManager::new(&self.shared)
    }

    /// Ticket cancellation, verification and lookup
    pub fn tickets(&self) -> TicketIssuer<'_> {
        TicketIssuer::new(&self.shared)
    }

    /// Event and seat map administration
    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(&self.shared)
    }

    pub fn config(&self) -> &ReservationConfig {
        &self.shared.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.shared.now()
    }

    /// Recompute an event's inventory counters from storage
    pub fn audit(&self, event_id: Uuid) -> Result<InventoryAudit> {
        let db = self.shared.db();
        let event = db
            .events()
            .find_by_id(event_id)?
            .ok_or(Error::EventNotFound(event_id))?;
        audit_event(db.conn(), &event)
    }

    /// Raw database access for tests that inject storage faults
    #[cfg(test)]
    pub(crate) fn with_db<T>(&self, f: impl FnOnce(&Database) -> T) -> T {
        f(&self.shared.db())
    }
}
