//! Hold lifecycle
//!
//! `Active` moves to exactly one of `Confirmed` or `Released`. Every
//! transition for an event runs under that event's lock inside one
//! immediate transaction, so concurrent callers observe them in a single
//! order. An active hold past its deadline is treated as expired by every
//! path that touches it; the sweeper only makes that happen sooner.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::invariants::check_event;
use crate::issuer;
use crate::ledger::{Availability, Ledger};
use crate::models::{Hold, HoldStatus, ReleaseCause, SeatSelection, Ticket};
use crate::office::Shared;
use crate::storage::{EventStore, HoldStore, SeatStore};

/// Overdue holds reclaimed per sweep pass
const SWEEP_BATCH: u32 = 256;

enum ConfirmOutcome {
    Confirmed(Vec<Ticket>),
    Expired,
}

/// Give back a hold's inventory and close it with `cause`
fn release_in_tx(
    conn: &Connection,
    hold: &Hold,
    cause: ReleaseCause,
    now: DateTime<Utc>,
) -> Result<()> {
    Ledger::new(conn).release(hold)?;
    if !HoldStore::new(conn).finalize(hold.id, HoldStatus::Released(cause), now)? {
        return Err(Error::Ledger(format!("hold {} was not active", hold.id)));
    }
    Ok(())
}

/// Release every overdue hold of an event
fn reclaim_overdue(conn: &Connection, event_id: Uuid, now: DateTime<Utc>) -> Result<usize> {
    let overdue = HoldStore::new(conn).list_overdue_for_event(event_id, now)?;
    for hold in &overdue {
        release_in_tx(conn, hold, ReleaseCause::Expired, now)?;
        warn!(hold_id = %hold.id, expires_at = %hold.expires_at, "Reclaimed overdue hold");
    }
    Ok(overdue.len())
}

pub struct HoldManager<'a> {
    shared: &'a Shared,
}

impl<'a> HoldManager<'a> {
    pub(crate) fn new(shared: &'a Shared) -> Self {
        Self { shared }
    }

    /// Reserve seats (or general admission units) for a user.
    ///
    /// The returned hold owns its inventory until `expires_at`, which is
    /// the configured TTL from now, clamped to the event start.
    #[instrument(skip_all, fields(event_id = %event_id, user_id = %user_id))]
    pub fn create_hold(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        selection: SeatSelection,
    ) -> Result<Hold> {
        let config = &self.shared.config;

        self.shared.with_event_lock(event_id, |db, now| {
            let tx = db.transaction()?;

            let event = EventStore::new(&tx)
                .find_by_id(event_id)?
                .ok_or(Error::EventNotFound(event_id))?;
            if event.has_started(now) {
                return Err(Error::EventStarted(event_id));
            }

            let reservation = selection.into_reservation(event.seated, config.max_seats_per_hold)?;
            let seats = SeatStore::new(&tx);
            for seat_id in reservation.seat_ids() {
                match seats.find_by_id(*seat_id)? {
                    Some(seat) if seat.event_id == event_id => {}
                    _ => return Err(Error::SeatNotFound(*seat_id)),
                }
            }

            reclaim_overdue(&tx, event_id, now)?;

            let expires_at = std::cmp::min(now + config.hold_ttl(), event.starts_at);
            let hold = Hold::new(event_id, user_id, reservation, now, expires_at);
            HoldStore::new(&tx).create(&hold)?;

            if let Err(err) = Ledger::new(&tx).try_hold(&hold) {
                if err.is_contention() {
                    debug!(error = %err, "Hold lost to contention");
                }
                return Err(err);
            }

            tx.commit()?;
            info!(
                hold_id = %hold.id,
                units = hold.reservation.units(),
                expires_at = %hold.expires_at,
                "Hold created"
            );
            check_event(db.conn(), &event);
            Ok(hold)
        })
    }

    /// Turn an active hold into tickets.
    ///
    /// A hold past its deadline, or for an event that has started, is
    /// released as expired (and that release is committed) before
    /// `Error::Expired` is returned. Any failure while
    /// minting rolls everything back and leaves the hold active.
    #[instrument(skip(self))]
    pub fn confirm_hold(&self, hold_id: Uuid) -> Result<Vec<Ticket>> {
        let event_id = self.shared.hold_event(hold_id)?;
        let code_attempts = self.shared.config.code_attempts;

        let outcome = self.shared.with_event_lock(event_id, |db, now| {
            let tx = db.transaction()?;

            let hold = HoldStore::new(&tx)
                .find_by_id(hold_id)?
                .ok_or(Error::HoldNotFound(hold_id))?;
            if hold.status.is_terminal() {
                return Err(Error::AlreadyFinalized {
                    hold_id,
                    status: hold.status,
                });
            }
            let event = EventStore::new(&tx)
                .find_by_id(event_id)?
                .ok_or(Error::EventNotFound(event_id))?;

            if hold.is_overdue(now) || event.has_started(now) {
                release_in_tx(&tx, &hold, ReleaseCause::Expired, now)?;
                tx.commit()?;
                warn!(
                    expires_at = %hold.expires_at,
                    starts_at = %event.starts_at,
                    "Confirm attempted on expired hold"
                );
                check_event(db.conn(), &event);
                return Ok(ConfirmOutcome::Expired);
            }

            let tickets = issuer::issue(&tx, &event, &hold, now, code_attempts)?;
            Ledger::new(&tx).confirm(&hold, &tickets)?;
            if !HoldStore::new(&tx).finalize(hold_id, HoldStatus::Confirmed, now)? {
                return Err(Error::Ledger(format!("hold {} was not active", hold_id)));
            }

            tx.commit()?;
            info!(tickets = tickets.len(), "Hold confirmed");
            check_event(db.conn(), &event);
            Ok(ConfirmOutcome::Confirmed(tickets))
        })?;

        match outcome {
            ConfirmOutcome::Confirmed(tickets) => Ok(tickets),
            ConfirmOutcome::Expired => Err(Error::Expired(hold_id)),
        }
    }

    /// Give a hold's inventory back. Already-finished holds are returned
    /// unchanged.
    #[instrument(skip(self))]
    pub fn release_hold(&self, hold_id: Uuid) -> Result<Hold> {
        let event_id = self.shared.hold_event(hold_id)?;

        self.shared.with_event_lock(event_id, |db, now| {
            let tx = db.transaction()?;

            let mut hold = HoldStore::new(&tx)
                .find_by_id(hold_id)?
                .ok_or(Error::HoldNotFound(hold_id))?;
            if hold.status.is_terminal() {
                debug!(status = %hold.status, "Release of finished hold ignored");
                return Ok(hold);
            }

            let cause = if hold.is_overdue(now) {
                ReleaseCause::Expired
            } else {
                ReleaseCause::Cancelled
            };
            release_in_tx(&tx, &hold, cause, now)?;
            tx.commit()?;

            hold.status = HoldStatus::Released(cause);
            hold.finalized_at = Some(now);
            info!(cause = cause.as_str(), "Hold released");

            if let Some(event) = db.events().find_by_id(event_id)? {
                check_event(db.conn(), &event);
            }
            Ok(hold)
        })
    }

    /// Read a hold as stored
    pub fn hold(&self, hold_id: Uuid) -> Result<Hold> {
        self.shared
            .db()
            .holds()
            .find_by_id(hold_id)?
            .ok_or(Error::HoldNotFound(hold_id))
    }

    /// Holds placed by a user, newest first
    pub fn holds_for_user(&self, user_id: Uuid) -> Result<Vec<Hold>> {
        self.shared.db().holds().list_for_user(user_id)
    }

    /// Inventory snapshot of an event. Overdue holds are shown as released
    /// without being written back.
    #[instrument(skip(self))]
    pub fn availability(&self, event_id: Uuid) -> Result<Availability> {
        let db = self.shared.db();
        let now = self.shared.now();
        let event = db
            .events()
            .find_by_id(event_id)?
            .ok_or(Error::EventNotFound(event_id))?;
        Ledger::new(db.conn()).availability(&event, now)
    }

    /// Release every active hold past its deadline. Returns how many were
    /// released.
    #[instrument(skip(self))]
    pub fn sweep_expired(&self) -> Result<usize> {
        // The connection is dropped before any event lock is taken
        let overdue = {
            let db = self.shared.db();
            db.holds().list_overdue(self.shared.now(), SWEEP_BATCH)?
        };

        let mut released = 0;
        for stale in overdue {
            let result = self.shared.with_event_lock(stale.event_id, |db, now| {
                let tx = db.transaction()?;
                // Re-check: it may have been confirmed or released meanwhile
                let current = match HoldStore::new(&tx).find_by_id(stale.id)? {
                    Some(hold) if hold.is_overdue(now) => hold,
                    _ => return Ok(false),
                };
                release_in_tx(&tx, &current, ReleaseCause::Expired, now)?;
                tx.commit()?;

                if let Some(event) = db.events().find_by_id(current.event_id)? {
                    check_event(db.conn(), &event);
                }
                Ok(true)
            });

            match result {
                Ok(true) => {
                    released += 1;
                    info!(hold_id = %stale.id, event_id = %stale.event_id, "Expired hold released");
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(hold_id = %stale.id, error = %err, "Failed to release expired hold");
                }
            }
        }

        Ok(released)
    }
}
