//! Ticket storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{format_datetime, parse_datetime, parse_uuid, parse_uuid_opt, OptionalExt};
use crate::error::Result;
use crate::models::{Admission, SeatLabel, Ticket};

const TICKET_COLUMNS: &str = "id, event_id, hold_id, user_id, purchased_at, price, code, used, seat_id, seat_section, seat_row, seat_number";

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let admission = match parse_uuid_opt(row.get::<_, Option<String>>(8)?)? {
        Some(seat_id) => Admission::Seated {
            seat_id,
            label: SeatLabel {
                section: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                row: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
                number: row.get::<_, Option<u32>>(11)?.unwrap_or_default(),
            },
        },
        None => Admission::General,
    };

    Ok(Ticket {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        event_id: parse_uuid(&row.get::<_, String>(1)?)?,
        hold_id: parse_uuid(&row.get::<_, String>(2)?)?,
        user_id: parse_uuid(&row.get::<_, String>(3)?)?,
        purchased_at: parse_datetime(&row.get::<_, String>(4)?)?,
        price: row.get(5)?,
        code: row.get(6)?,
        used: row.get::<_, i32>(7)? != 0,
        admission,
    })
}

pub struct TicketStore<'a> {
    conn: &'a Connection,
}

impl<'a> TicketStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Persist a newly minted ticket
    #[instrument(skip(self, ticket), fields(ticket_id = %ticket.id, event_id = %ticket.event_id))]
    pub fn create(&self, ticket: &Ticket) -> Result<()> {
        let (seat_id, section, row, number) = match &ticket.admission {
            Admission::Seated { seat_id, label } => (
                Some(seat_id.to_string()),
                Some(label.section.as_str()),
                Some(label.row.as_str()),
                Some(label.number),
            ),
            Admission::General => (None, None, None, None),
        };

        self.conn.execute(
            "INSERT INTO tickets (id, event_id, hold_id, user_id, purchased_at, price, code, used, seat_id, seat_section, seat_row, seat_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                ticket.id.to_string(),
                ticket.event_id.to_string(),
                ticket.hold_id.to_string(),
                ticket.user_id.to_string(),
                format_datetime(&ticket.purchased_at),
                ticket.price,
                ticket.code,
                ticket.used as i32,
                seat_id,
                section,
                row,
                number,
            ],
        )?;
        Ok(())
    }

    /// Find ticket by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Ticket>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLUMNS))?;

        let ticket = stmt
            .query_row(params![id.to_string()], ticket_from_row)
            .optional()?;

        Ok(ticket)
    }

    /// Find ticket by redemption code
    #[instrument(skip(self, code))]
    pub fn find_by_code(&self, code: &str) -> Result<Option<Ticket>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tickets WHERE code = ?1", TICKET_COLUMNS))?;

        let ticket = stmt.query_row(params![code], ticket_from_row).optional()?;

        Ok(ticket)
    }

    /// Is a code already taken by a live ticket?
    pub fn code_exists(&self, code: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tickets WHERE code = ?1)",
            params![code],
            |row| row.get::<_, i32>(0),
        )?;
        Ok(exists != 0)
    }

    /// Tickets held by a user, newest first
    #[instrument(skip(self))]
    pub fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tickets WHERE user_id = ?1 ORDER BY purchased_at DESC",
            TICKET_COLUMNS
        ))?;

        let tickets = stmt
            .query_map(params![user_id.to_string()], ticket_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tickets)
    }

    /// Tickets minted from one hold
    pub fn list_for_hold(&self, hold_id: Uuid) -> Result<Vec<Ticket>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tickets WHERE hold_id = ?1 ORDER BY seat_section, seat_row, seat_number",
            TICKET_COLUMNS
        ))?;

        let tickets = stmt
            .query_map(params![hold_id.to_string()], ticket_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tickets)
    }

    /// Number of live tickets for an event
    pub fn count_for_event(&self, event_id: Uuid) -> Result<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM tickets WHERE event_id = ?1",
            params![event_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Mark a ticket as used. Returns false if it was already used.
    #[instrument(skip(self))]
    pub fn mark_used(&self, ticket_id: Uuid) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE tickets SET used = 1 WHERE id = ?1 AND used = 0",
            params![ticket_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// Delete a ticket
    #[instrument(skip(self))]
    pub fn delete(&self, ticket_id: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM tickets WHERE id = ?1",
            params![ticket_id.to_string()],
        )?;
        Ok(())
    }
}
