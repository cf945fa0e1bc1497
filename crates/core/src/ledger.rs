//! Seat ledger and capacity counter transitions
//!
//! Every call runs inside the caller's open transaction and either applies
//! its whole transition or reports why it could not. Nothing here takes
//! locks; the hold manager serializes callers per event.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Admission, Event, Hold, Reservation, Seat, Ticket};
use crate::storage::{CapacityStore, HoldStore, SeatStore};

/// Read-only inventory snapshot of one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Availability {
    /// Seat map; seats of overdue holds already show as available
    Seated { event_id: Uuid, seats: Vec<Seat> },
    /// Counters; units of overdue holds are not counted as held
    General {
        event_id: Uuid,
        total: u32,
        held: u32,
        sold: u32,
        remaining: u32,
    },
}

impl Availability {
    /// Admissions that could be held right now
    pub fn remaining(&self) -> u32 {
        match self {
            Availability::Seated { seats, .. } => {
                seats.iter().filter(|s| s.state.is_available()).count() as u32
            }
            Availability::General { remaining, .. } => *remaining,
        }
    }

    pub fn seat(&self, seat_id: Uuid) -> Option<&Seat> {
        match self {
            Availability::Seated { seats, .. } => seats.iter().find(|s| s.id == seat_id),
            Availability::General { .. } => None,
        }
    }
}

pub(crate) struct Ledger<'a> {
    conn: &'a Connection,
}

impl<'a> Ledger<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Reserve everything the hold covers, or nothing
    #[instrument(skip(self, hold), fields(hold_id = %hold.id, units = hold.reservation.units()))]
    pub(crate) fn try_hold(&self, hold: &Hold) -> Result<()> {
        match &hold.reservation {
            Reservation::Seats(ids) => {
                let seats = SeatStore::new(self.conn);

                // Check first so a conflict never leaves some seats marked
                for seat_id in ids {
                    let seat = seats
                        .find_by_id(*seat_id)?
                        .filter(|s| s.event_id == hold.event_id)
                        .ok_or(Error::SeatNotFound(*seat_id))?;
                    if !seat.state.is_available() {
                        return Err(Error::SeatUnavailable(*seat_id));
                    }
                }

                for seat_id in ids {
                    if !seats.mark_held(hold.event_id, *seat_id, hold.id, hold.expires_at)? {
                        return Err(Error::SeatUnavailable(*seat_id));
                    }
                }
                Ok(())
            }
            Reservation::GeneralAdmission { quantity } => {
                let capacity = CapacityStore::new(self.conn);
                if capacity.try_hold(hold.event_id, *quantity)? {
                    return Ok(());
                }
                let remaining = capacity
                    .get(hold.event_id)?
                    .map(|slot| slot.remaining())
                    .ok_or_else(|| {
                        Error::Ledger(format!("no capacity counter for event {}", hold.event_id))
                    })?;
                Err(Error::CapacityExceeded {
                    requested: *quantity,
                    remaining,
                })
            }
        }
    }

    /// Move the hold's inventory to sold, bound to the minted tickets.
    ///
    /// The tickets must cover exactly what the hold reserved.
    #[instrument(skip(self, hold, tickets), fields(hold_id = %hold.id))]
    pub(crate) fn confirm(&self, hold: &Hold, tickets: &[Ticket]) -> Result<()> {
        match &hold.reservation {
            Reservation::Seats(ids) => {
                let mut bound: Vec<Uuid> = tickets
                    .iter()
                    .filter_map(|t| t.admission.seat_id())
                    .collect();
                bound.sort();
                if bound.len() != tickets.len() || bound != *ids {
                    return Err(Error::Ledger(format!(
                        "tickets do not match seats held by {}",
                        hold.id
                    )));
                }

                let seats = SeatStore::new(self.conn);
                for ticket in tickets {
                    if let Admission::Seated { seat_id, .. } = &ticket.admission {
                        if !seats.mark_sold(*seat_id, hold.id, ticket.id)? {
                            return Err(Error::Ledger(format!(
                                "seat {} is no longer held by {}",
                                seat_id, hold.id
                            )));
                        }
                    }
                }
                Ok(())
            }
            Reservation::GeneralAdmission { quantity } => {
                let general = tickets
                    .iter()
                    .filter(|t| t.admission == Admission::General)
                    .count();
                if general != tickets.len() || general as u32 != *quantity {
                    return Err(Error::Ledger(format!(
                        "{} tickets minted for {} held admissions",
                        tickets.len(),
                        quantity
                    )));
                }
                if !CapacityStore::new(self.conn).confirm(hold.event_id, *quantity)? {
                    return Err(Error::Ledger(format!(
                        "held count for event {} is below {}",
                        hold.event_id, quantity
                    )));
                }
                Ok(())
            }
        }
    }

    /// Return the hold's inventory to the pool
    #[instrument(skip(self, hold), fields(hold_id = %hold.id))]
    pub(crate) fn release(&self, hold: &Hold) -> Result<()> {
        match &hold.reservation {
            Reservation::Seats(ids) => {
                let seats = SeatStore::new(self.conn);
                for seat_id in ids {
                    // Seats no longer held by this hold are left alone
                    seats.release_held(*seat_id, hold.id)?;
                }
                Ok(())
            }
            Reservation::GeneralAdmission { quantity } => {
                if !CapacityStore::new(self.conn).release_held(hold.event_id, *quantity)? {
                    return Err(Error::Ledger(format!(
                        "held count for event {} is below {}",
                        hold.event_id, quantity
                    )));
                }
                Ok(())
            }
        }
    }

    /// Give a cancelled ticket's admission back
    #[instrument(skip(self, ticket), fields(ticket_id = %ticket.id))]
    pub(crate) fn return_sold(&self, ticket: &Ticket) -> Result<()> {
        let returned = match &ticket.admission {
            Admission::Seated { seat_id, .. } => {
                SeatStore::new(self.conn).release_sold(*seat_id, ticket.id)?
            }
            Admission::General => CapacityStore::new(self.conn).release_sold(ticket.event_id, 1)?,
        };
        if !returned {
            return Err(Error::Ledger(format!(
                "ticket {} does not own a sold admission",
                ticket.id
            )));
        }
        Ok(())
    }

    /// Snapshot as seen at `now`, without reclaiming anything
    pub(crate) fn availability(&self, event: &Event, now: DateTime<Utc>) -> Result<Availability> {
        if event.seated {
            let seats = SeatStore::new(self.conn)
                .list_for_event(event.id)?
                .into_iter()
                .map(|mut seat| {
                    seat.state = seat.state.effective(now);
                    seat
                })
                .collect();
            return Ok(Availability::Seated {
                event_id: event.id,
                seats,
            });
        }

        let slot = CapacityStore::new(self.conn)
            .get(event.id)?
            .ok_or_else(|| Error::Ledger(format!("no capacity counter for event {}", event.id)))?;
        let (_, overdue) = HoldStore::new(self.conn).active_units(event.id, now)?;
        let held = slot.held.saturating_sub(overdue);
        Ok(Availability::General {
            event_id: event.id,
            total: slot.total,
            held,
            sold: slot.sold,
            remaining: slot.total.saturating_sub(slot.sold + held),
        })
    }
}
