//! Inventory guardrails
//!
//! `audit_event` recomputes an event's counters from the ledger, the holds
//! and the issued tickets. Debug builds assert the result after every
//! committed mutation; the checks are compiled out in release builds.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Event;
use crate::storage::{CapacityStore, HoldStore, SeatStore, TicketStore};

/// Counters of one event as recorded by each store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAudit {
    pub event_id: Uuid,
    pub seated: bool,
    /// Event capacity
    pub capacity: u32,
    /// Seats defined (seated) or counter total (general admission)
    pub total: u32,
    pub held: u32,
    pub sold: u32,
    /// Units reserved by holds still marked active, overdue or not
    pub active_hold_units: u32,
    pub live_tickets: u32,
}

impl InventoryAudit {
    /// Human-readable description of every broken invariant
    pub fn violations(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.sold + self.held > self.total {
            problems.push(format!(
                "sold {} + held {} exceeds total {}",
                self.sold, self.held, self.total
            ));
        }
        if self.sold != self.live_tickets {
            problems.push(format!(
                "{} sold but {} live tickets",
                self.sold, self.live_tickets
            ));
        }
        if self.held != self.active_hold_units {
            problems.push(format!(
                "{} held but active holds cover {}",
                self.held, self.active_hold_units
            ));
        }
        if self.seated && self.total > self.capacity {
            problems.push(format!(
                "{} seats defined for capacity {}",
                self.total, self.capacity
            ));
        }

        problems
    }

    pub fn is_consistent(&self) -> bool {
        self.violations().is_empty()
    }
}

/// Recompute the counters of an event
pub fn audit_event(conn: &Connection, event: &Event) -> Result<InventoryAudit> {
    let (total, held, sold) = if event.seated {
        let seats = SeatStore::new(conn);
        (
            seats.count_for_event(event.id)?,
            seats.count_in_state(event.id, "held")?,
            seats.count_in_state(event.id, "sold")?,
        )
    } else {
        match CapacityStore::new(conn).get(event.id)? {
            Some(slot) => (slot.total, slot.held, slot.sold),
            None => (0, 0, 0),
        }
    };

    // Overdue holds still own their inventory until released
    let active_hold_units = HoldStore::new(conn).held_units(event.id)?;

    Ok(InventoryAudit {
        event_id: event.id,
        seated: event.seated,
        capacity: event.capacity,
        total,
        held,
        sold,
        active_hold_units,
        live_tickets: TicketStore::new(conn).count_for_event(event.id)?,
    })
}

/// Validate that an event's inventory is internally consistent
pub fn assert_inventory_invariants(audit: &InventoryAudit) {
    let problems = audit.violations();
    debug_assert!(
        problems.is_empty(),
        "Event {} inventory is inconsistent: {}",
        audit.event_id,
        problems.join("; ")
    );
}

/// Audit and assert after a commit (debug builds only)
pub(crate) fn check_event(conn: &Connection, event: &Event) {
    if cfg!(debug_assertions) {
        if let Ok(audit) = audit_event(conn, event) {
            assert_inventory_invariants(&audit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::models::{Hold, NewEvent, NewSeat, Reservation};
    use crate::storage::Database;

    fn audit(total: u32, held: u32, sold: u32) -> InventoryAudit {
        InventoryAudit {
            event_id: Uuid::new_v4(),
            seated: false,
            capacity: total,
            total,
            held,
            sold,
            active_hold_units: held,
            live_tickets: sold,
        }
    }

    #[test]
    fn test_consistent_audit_passes() {
        let audit = audit(10, 3, 4);
        assert!(audit.is_consistent());
        assert_inventory_invariants(&audit);
    }

    #[test]
    fn test_oversell_detected() {
        let mut audit = audit(2, 1, 1);
        audit.sold = 2;
        audit.live_tickets = 2;
        let problems = audit.violations();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("exceeds total"));
    }

    #[test]
    fn test_orphaned_counts_detected() {
        let mut audit = audit(10, 2, 2);
        audit.live_tickets = 1;
        audit.active_hold_units = 0;
        assert_eq!(audit.violations().len(), 2);
    }

    #[test]
    #[should_panic(expected = "inventory is inconsistent")]
    #[cfg(debug_assertions)]
    fn test_assert_panics_in_debug() {
        let mut audit = audit(1, 0, 0);
        audit.sold = 2;
        assert_inventory_invariants(&audit);
    }

    #[test]
    fn test_audit_reads_seated_event() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let event = NewEvent::seated("Play", now + Duration::days(1), 4, 100).into_event(now);
        db.events().create(&event).unwrap();
        let seat = NewSeat::new("Circle", "B", 2).into_seat(event.id);
        db.seats().create(&seat).unwrap();

        let hold = Hold::new(
            event.id,
            Uuid::new_v4(),
            Reservation::Seats(vec![seat.id]),
            now,
            now + Duration::minutes(10),
        );
        db.holds().create(&hold).unwrap();
        db.seats()
            .mark_held(event.id, seat.id, hold.id, hold.expires_at)
            .unwrap();

        let audit = audit_event(db.conn(), &event).unwrap();
        assert_eq!((audit.total, audit.held, audit.sold), (1, 1, 0));
        assert_eq!(audit.active_hold_units, 1);
        assert!(audit.is_consistent());
    }

    #[test]
    fn test_audit_counts_overdue_holds_regardless_of_time() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let event = NewEvent::general("Fair", now + Duration::days(1), 5, 0).into_event(now);
        db.events().create(&event).unwrap();
        db.capacity().create(event.id, 5).unwrap();

        // Deadline long past but never released
        let hold = Hold::new(
            event.id,
            Uuid::new_v4(),
            Reservation::GeneralAdmission { quantity: 2 },
            now - Duration::hours(2),
            now - Duration::hours(1),
        );
        db.holds().create(&hold).unwrap();
        assert!(db.capacity().try_hold(event.id, 2).unwrap());

        let audit = audit_event(db.conn(), &event).unwrap();
        assert_eq!(audit.held, 2);
        assert_eq!(audit.active_hold_units, 2);
        assert!(audit.is_consistent());
    }
}
