//! Ticket minting, cancellation and redemption

use std::collections::HashSet;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rusqlite::Connection;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::invariants::check_event;
use crate::ledger::Ledger;
use crate::models::{Admission, Event, Hold, Reservation, Ticket};
use crate::office::Shared;
use crate::storage::{EventStore, SeatStore, TicketStore};

/// Random bytes behind a ticket code (96 bits, 16 base64url characters)
const CODE_BYTES: usize = 12;

fn generate_code() -> String {
    let mut bytes = [0u8; CODE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A code not used by any live ticket nor by this batch
fn unique_code(
    tickets: &TicketStore<'_>,
    batch: &HashSet<String>,
    attempts: u32,
    mut generate: impl FnMut() -> String,
) -> Result<String> {
    for attempt in 1..=attempts {
        let code = generate();
        if !batch.contains(&code) && !tickets.code_exists(&code)? {
            return Ok(code);
        }
        warn!(attempt, "Ticket code collision");
    }
    Err(Error::CodeSpaceExhausted(attempts))
}

/// Mint one ticket per admission the hold covers.
///
/// Runs inside the confirming transaction; the caller binds the tickets to
/// the ledger before committing.
pub(crate) fn issue(
    conn: &Connection,
    event: &Event,
    hold: &Hold,
    now: DateTime<Utc>,
    attempts: u32,
) -> Result<Vec<Ticket>> {
    issue_with(conn, event, hold, now, attempts, generate_code)
}

fn issue_with(
    conn: &Connection,
    event: &Event,
    hold: &Hold,
    now: DateTime<Utc>,
    attempts: u32,
    mut generate: impl FnMut() -> String,
) -> Result<Vec<Ticket>> {
    let admissions: Vec<(Admission, i64)> = match &hold.reservation {
        Reservation::Seats(ids) => {
            let seats = SeatStore::new(conn);
            ids.iter()
                .map(|seat_id| {
                    let seat = seats
                        .find_by_id(*seat_id)?
                        .ok_or(Error::SeatNotFound(*seat_id))?;
                    let price = seat.price_for(event.base_price);
                    Ok((
                        Admission::Seated {
                            seat_id: seat.id,
                            label: seat.label,
                        },
                        price,
                    ))
                })
                .collect::<Result<_>>()?
        }
        Reservation::GeneralAdmission { quantity } => (0..*quantity)
            .map(|_| (Admission::General, event.base_price))
            .collect(),
    };

    let store = TicketStore::new(conn);
    let mut codes = HashSet::with_capacity(admissions.len());
    let mut tickets = Vec::with_capacity(admissions.len());

    for (admission, price) in admissions {
        let code = unique_code(&store, &codes, attempts, &mut generate)?;
        codes.insert(code.clone());

        let ticket = Ticket {
            id: Uuid::new_v4(),
            event_id: event.id,
            hold_id: hold.id,
            user_id: hold.user_id,
            purchased_at: now,
            price,
            code,
            used: false,
            admission,
        };
        store.create(&ticket)?;
        tickets.push(ticket);
    }

    info!(hold_id = %hold.id, count = tickets.len(), "Tickets issued");
    Ok(tickets)
}

pub struct TicketIssuer<'a> {
    shared: &'a Shared,
}

impl<'a> TicketIssuer<'a> {
    pub(crate) fn new(shared: &'a Shared) -> Self {
        Self { shared }
    }

    /// Cancel a ticket before its event starts, returning the seat (or
    /// admission) to the pool.
    #[instrument(skip(self))]
    pub fn cancel(&self, ticket_id: Uuid) -> Result<()> {
        let event_id = self.shared.ticket_event(ticket_id)?;

        self.shared.with_event_lock(event_id, |db, now| {
            let tx = db.transaction()?;

            let ticket = TicketStore::new(&tx)
                .find_by_id(ticket_id)?
                .ok_or_else(|| Error::TicketNotFound(ticket_id.to_string()))?;
            let event = EventStore::new(&tx)
                .find_by_id(event_id)?
                .ok_or(Error::EventNotFound(event_id))?;
            if event.has_started(now) {
                return Err(Error::EventStarted(event_id));
            }

            TicketStore::new(&tx).delete(ticket_id)?;
            Ledger::new(&tx).return_sold(&ticket)?;
            tx.commit()?;

            info!(event_id = %event_id, "Ticket cancelled");
            check_event(db.conn(), &event);
            Ok(())
        })
    }

    /// Is `code` a ticket that would admit someone right now?
    #[instrument(skip(self, code))]
    pub fn verify(&self, code: &str) -> Result<bool> {
        let db = self.shared.db();
        let Some(ticket) = db.tickets().find_by_code(code)? else {
            return Ok(false);
        };
        let Some(event) = db.events().find_by_id(ticket.event_id)? else {
            return Ok(false);
        };
        Ok(ticket.is_valid(event.starts_at, self.shared.now()))
    }

    /// Mark a ticket as used at the door
    #[instrument(skip(self))]
    pub fn redeem(&self, ticket_id: Uuid) -> Result<Ticket> {
        let event_id = self.shared.ticket_event(ticket_id)?;

        self.shared.with_event_lock(event_id, |db, _now| {
            let mut ticket = db
                .tickets()
                .find_by_id(ticket_id)?
                .ok_or_else(|| Error::TicketNotFound(ticket_id.to_string()))?;
            if !db.tickets().mark_used(ticket_id)? {
                return Err(Error::TicketAlreadyUsed(ticket_id));
            }
            ticket.used = true;
            info!("Ticket redeemed");
            Ok(ticket)
        })
    }

    pub fn ticket(&self, ticket_id: Uuid) -> Result<Ticket> {
        self.shared
            .db()
            .tickets()
            .find_by_id(ticket_id)?
            .ok_or_else(|| Error::TicketNotFound(ticket_id.to_string()))
    }

    pub fn ticket_by_code(&self, code: &str) -> Result<Ticket> {
        self.shared
            .db()
            .tickets()
            .find_by_code(code)?
            .ok_or_else(|| Error::TicketNotFound(code.to_string()))
    }

    /// Tickets held by a user, newest first
    pub fn tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>> {
        self.shared.db().tickets().list_for_user(user_id)
    }

    /// Tickets minted from one hold
    pub fn tickets_for_hold(&self, hold_id: Uuid) -> Result<Vec<Ticket>> {
        self.shared.db().tickets().list_for_hold(hold_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, SubsecRound};

    use crate::clock::{Clock, ManualClock};
    use crate::config::ReservationConfig;
    use crate::models::{NewEvent, NewSeat, SeatSelection};
    use crate::office::BoxOffice;
    use crate::storage::Database;

    fn office() -> (BoxOffice, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now().trunc_subsecs(6)));
        let office = BoxOffice::with_clock(
            Database::open_in_memory().unwrap(),
            ReservationConfig::default(),
            clock.clone(),
        )
        .unwrap();
        (office, clock)
    }

    fn sold_seat(office: &BoxOffice, clock: &ManualClock) -> (Event, Ticket) {
        let event = office
            .catalog()
            .create_event(NewEvent::seated(
                "Cabaret",
                clock.now() + Duration::hours(6),
                5,
                1200,
            ))
            .unwrap();
        let seat = office
            .catalog()
            .add_seat(event.id, NewSeat::new("Floor", "D", 4))
            .unwrap();
        let hold = office
            .holds()
            .create_hold(event.id, Uuid::new_v4(), SeatSelection::Seats(vec![seat.id]))
            .unwrap();
        let mut tickets = office.holds().confirm_hold(hold.id).unwrap();
        (event, tickets.remove(0))
    }

    #[test]
    fn test_generated_codes_are_url_safe() {
        let code = generate_code();
        assert_eq!(code.len(), 16);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(code, generate_code());
    }

    #[test]
    fn test_code_collisions_retried_then_exhausted() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let event = NewEvent::general("Expo", now + Duration::days(1), 5, 300).into_event(now);
        db.events().create(&event).unwrap();
        db.capacity().create(event.id, 5).unwrap();
        let hold = Hold::new(
            event.id,
            Uuid::new_v4(),
            Reservation::GeneralAdmission { quantity: 2 },
            now,
            now + Duration::minutes(10),
        );

        // The same code twice in one batch is a collision
        let mut fixed = ["AAAA", "AAAA", "BBBB"].into_iter().map(String::from);
        let tickets =
            issue_with(db.conn(), &event, &hold, now, 3, || fixed.next().unwrap()).unwrap();
        let codes: Vec<_> = tickets.iter().map(|t| t.code.as_str()).collect();
        assert_eq!(codes, ["AAAA", "BBBB"]);

        // Both codes are now taken by live tickets
        let hold = Hold {
            id: Uuid::new_v4(),
            ..hold
        };
        let err = issue_with(db.conn(), &event, &hold, now, 4, || "AAAA".to_string())
            .unwrap_err();
        assert!(matches!(err, Error::CodeSpaceExhausted(4)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cancel_returns_seat() {
        let (office, clock) = office();
        let (event, ticket) = sold_seat(&office, &clock);

        office.tickets().cancel(ticket.id).unwrap();

        let seat_id = ticket.admission.seat_id().unwrap();
        let availability = office.holds().availability(event.id).unwrap();
        assert!(availability.seat(seat_id).unwrap().state.is_available());
        assert!(matches!(
            office.tickets().ticket(ticket.id),
            Err(Error::TicketNotFound(_))
        ));
        assert!(matches!(
            office.tickets().cancel(ticket.id),
            Err(Error::TicketNotFound(_))
        ));
    }

    #[test]
    fn test_cancel_after_start_rejected() {
        let (office, clock) = office();
        let (event, ticket) = sold_seat(&office, &clock);

        clock.advance(Duration::hours(7));
        assert!(matches!(
            office.tickets().cancel(ticket.id),
            Err(Error::EventStarted(id)) if id == event.id
        ));
        assert!(office.tickets().ticket(ticket.id).is_ok());
    }

    #[test]
    fn test_verify_and_redeem() {
        let (office, clock) = office();
        let (_, ticket) = sold_seat(&office, &clock);
        let tickets = office.tickets();

        assert!(tickets.verify(&ticket.code).unwrap());
        assert!(!tickets.verify("not-a-code").unwrap());
        assert_eq!(tickets.ticket_by_code(&ticket.code).unwrap().id, ticket.id);

        let redeemed = tickets.redeem(ticket.id).unwrap();
        assert!(redeemed.used);
        assert!(!tickets.verify(&ticket.code).unwrap());
        assert!(matches!(
            tickets.redeem(ticket.id),
            Err(Error::TicketAlreadyUsed(_))
        ));
        assert!(matches!(
            tickets.redeem(Uuid::new_v4()),
            Err(Error::TicketNotFound(_))
        ));
    }

    #[test]
    fn test_verify_fails_once_event_started() {
        let (office, clock) = office();
        let (_, ticket) = sold_seat(&office, &clock);

        clock.advance(Duration::hours(6));
        assert!(!office.tickets().verify(&ticket.code).unwrap());
    }

    #[test]
    fn test_tickets_for_user_and_hold() {
        let (office, clock) = office();
        let (_, ticket) = sold_seat(&office, &clock);

        let mine = office.tickets().tickets_for_user(ticket.user_id).unwrap();
        assert_eq!(mine, vec![ticket.clone()]);
        assert_eq!(
            office.tickets().tickets_for_hold(ticket.hold_id).unwrap().len(),
            1
        );
        assert!(office
            .tickets()
            .tickets_for_user(Uuid::new_v4())
            .unwrap()
            .is_empty());
    }
}
