//! Event and seat map administration
//!
//! Start time, capacity and seating mode are frozen once any ticket has
//! been sold; the name and descriptive fields stay editable.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Event, EventUpdate, NewEvent, NewSeat, Seat};
use crate::office::Shared;
use crate::storage::{CapacityStore, EventStore, HoldStore, SeatStore, TicketStore};

pub struct Catalog<'a> {
    shared: &'a Shared,
}

impl<'a> Catalog<'a> {
    pub(crate) fn new(shared: &'a Shared) -> Self {
        Self { shared }
    }

    /// Create an event. General admission events get their capacity
    /// counter here.
    #[instrument(skip(self, new_event), fields(name = %new_event.name))]
    pub fn create_event(&self, new_event: NewEvent) -> Result<Event> {
        let now = self.shared.now();
        new_event.validate(now)?;
        let event = new_event.into_event(now);

        self.shared.with_event_lock(event.id, |db, _now| {
            let tx = db.transaction()?;
            EventStore::new(&tx).create(&event)?;
            if !event.seated {
                CapacityStore::new(&tx).create(event.id, event.capacity)?;
            }
            tx.commit()?;
            Ok(())
        })?;

        info!(event_id = %event.id, seated = event.seated, capacity = event.capacity, "Event created");
        Ok(event)
    }

    /// Add a numbered seat to a seated event
    #[instrument(skip(self, new_seat), fields(label = %new_seat.label))]
    pub fn add_seat(&self, event_id: Uuid, new_seat: NewSeat) -> Result<Seat> {
        new_seat.validate()?;

        self.shared.with_event_lock(event_id, |db, _now| {
            let tx = db.transaction()?;

            let event = EventStore::new(&tx)
                .find_by_id(event_id)?
                .ok_or(Error::EventNotFound(event_id))?;
            if !event.seated {
                return Err(Error::InvalidOperation(
                    "general admission events have no numbered seats".into(),
                ));
            }

            let seats = SeatStore::new(&tx);
            if seats.count_for_event(event_id)? >= event.capacity {
                return Err(Error::InvalidOperation(format!(
                    "event already has {} seats",
                    event.capacity
                )));
            }
            if seats.find_by_label(event_id, &new_seat.label)?.is_some() {
                return Err(Error::InvalidOperation(format!(
                    "seat {} already exists",
                    new_seat.label
                )));
            }

            let seat = new_seat.into_seat(event_id);
            seats.create(&seat)?;
            tx.commit()?;

            info!(seat_id = %seat.id, event_id = %event_id, "Seat added");
            Ok(seat)
        })
    }

    /// Change event details
    #[instrument(skip(self, update))]
    pub fn update_event(&self, event_id: Uuid, update: EventUpdate) -> Result<Event> {
        self.shared.with_event_lock(event_id, |db, now| {
            let tx = db.transaction()?;

            let mut event = EventStore::new(&tx)
                .find_by_id(event_id)?
                .ok_or(Error::EventNotFound(event_id))?;

            if update.touches_inventory(&event)
                && TicketStore::new(&tx).count_for_event(event_id)? > 0
            {
                return Err(Error::EventLocked(event_id));
            }

            if let Some(name) = update.name {
                if name.trim().is_empty() {
                    return Err(Error::InvalidOperation("event name is empty".into()));
                }
                event.name = name;
            }
            if let Some(description) = update.description {
                event.description = description.trim().to_string();
            }
            if let Some(location) = update.location {
                event.location = location.trim().to_string();
            }
            if let Some(category) = update.category {
                event.category = category.trim().to_string();
            }

            if let Some(starts_at) = update.starts_at {
                if starts_at <= now {
                    return Err(Error::InvalidOperation(
                        "event must start in the future".into(),
                    ));
                }
                if starts_at < event.starts_at {
                    // Holds never outlive the event
                    let clamped = HoldStore::new(&tx).clamp_expiry(event_id, starts_at)?;
                    SeatStore::new(&tx).clamp_hold_expiry(event_id, starts_at)?;
                    if clamped > 0 {
                        info!(event_id = %event_id, holds = clamped, "Hold deadlines moved to new start");
                    }
                }
                event.starts_at = starts_at;
            }

            let seated = update.seated.unwrap_or(event.seated);
            if seated != event.seated {
                let seat_count = SeatStore::new(&tx).count_for_event(event_id)?;
                let held = HoldStore::new(&tx).held_units(event_id)?;
                if seat_count > 0 || held > 0 {
                    return Err(Error::InvalidOperation(
                        "seating mode can only change while the event has no seats or holds"
                            .into(),
                    ));
                }
                let capacity = CapacityStore::new(&tx);
                if seated {
                    capacity.delete(event_id)?;
                } else {
                    capacity.create(event_id, update.capacity.unwrap_or(event.capacity))?;
                }
                event.seated = seated;
            }

            if let Some(new_capacity) = update.capacity {
                if new_capacity == 0 {
                    return Err(Error::InvalidOperation("capacity must be positive".into()));
                }
                if event.seated {
                    let seat_count = SeatStore::new(&tx).count_for_event(event_id)?;
                    if new_capacity < seat_count {
                        return Err(Error::InvalidOperation(format!(
                            "event already has {} seats",
                            seat_count
                        )));
                    }
                } else if !CapacityStore::new(&tx).set_total(event_id, new_capacity)? {
                    return Err(Error::InvalidOperation(
                        "capacity cannot drop below admissions already held".into(),
                    ));
                }
                event.capacity = new_capacity;
            }

            EventStore::new(&tx).update(&event)?;
            tx.commit()?;

            info!(event_id = %event_id, "Event updated");
            Ok(event)
        })
    }

    /// Delete an event that has sold nothing, with its seats and holds
    #[instrument(skip(self))]
    pub fn delete_event(&self, event_id: Uuid) -> Result<()> {
        self.shared.with_event_lock(event_id, |db, _now| {
            let tx = db.transaction()?;

            if EventStore::new(&tx).find_by_id(event_id)?.is_none() {
                return Err(Error::EventNotFound(event_id));
            }
            if TicketStore::new(&tx).count_for_event(event_id)? > 0 {
                return Err(Error::EventLocked(event_id));
            }

            EventStore::new(&tx).delete(event_id)?;
            tx.commit()?;
            info!(event_id = %event_id, "Event deleted");
            Ok(())
        })
    }

    pub fn event(&self, event_id: Uuid) -> Result<Event> {
        self.shared
            .db()
            .events()
            .find_by_id(event_id)?
            .ok_or(Error::EventNotFound(event_id))
    }

    /// Events that have not started yet, soonest first
    pub fn upcoming(&self) -> Result<Vec<Event>> {
        let now = self.shared.now();
        self.shared.db().events().list_upcoming(now)
    }

    /// Events whose name, description or location mentions `term`. A blank
    /// term lists upcoming events.
    pub fn search(&self, term: &str) -> Result<Vec<Event>> {
        let term = term.trim();
        if term.is_empty() {
            return self.upcoming();
        }
        self.shared.db().events().search(term)
    }

    /// Events tagged with `category`. A blank category lists upcoming events.
    pub fn by_category(&self, category: &str) -> Result<Vec<Event>> {
        let category = category.trim();
        if category.is_empty() {
            return self.upcoming();
        }
        self.shared.db().events().list_by_category(category)
    }

    /// Events starting between `from` and `to`, both inclusive
    pub fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>> {
        if from > to {
            return Err(Error::InvalidOperation(
                "date range ends before it starts".into(),
            ));
        }
        self.shared.db().events().list_between(from, to)
    }

    /// Seat map of an event as stored
    pub fn seats(&self, event_id: Uuid) -> Result<Vec<Seat>> {
        self.shared.db().seats().list_for_event(event_id)
    }
}
