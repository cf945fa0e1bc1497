//! Seat ledger storage operations
//!
//! State transitions are conditional updates: each reports whether the
//! seat was in the expected state, so callers can detect lost races.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{format_datetime, parse_uuid, seat_state_from_columns, OptionalExt};
use crate::error::Result;
use crate::models::{Seat, SeatLabel};

const SEAT_COLUMNS: &str =
    "id, event_id, section, row_label, number, multiplier, state, hold_id, hold_expires_at, ticket_id";

fn seat_from_row(row: &Row<'_>) -> rusqlite::Result<Seat> {
    Ok(Seat {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        event_id: parse_uuid(&row.get::<_, String>(1)?)?,
        label: SeatLabel {
            section: row.get(2)?,
            row: row.get(3)?,
            number: row.get(4)?,
        },
        multiplier: row.get(5)?,
        state: seat_state_from_columns(
            &row.get::<_, String>(6)?,
            row.get(7)?,
            row.get(8)?,
            row.get(9)?,
        )?,
    })
}

pub struct SeatStore<'a> {
    conn: &'a Connection,
}

impl<'a> SeatStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Add a seat (always starts available)
    #[instrument(skip(self, seat), fields(seat_id = %seat.id, label = %seat.label))]
    pub fn create(&self, seat: &Seat) -> Result<()> {
        self.conn.execute(
            "INSERT INTO seats (id, event_id, section, row_label, number, multiplier, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'available')",
            params![
                seat.id.to_string(),
                seat.event_id.to_string(),
                seat.label.section,
                seat.label.row,
                seat.label.number,
                seat.multiplier,
            ],
        )?;
        Ok(())
    }

    /// Find seat by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Seat>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM seats WHERE id = ?1", SEAT_COLUMNS))?;

        let seat = stmt
            .query_row(params![id.to_string()], seat_from_row)
            .optional()?;

        Ok(seat)
    }

    /// Find seat by its label within an event
    pub fn find_by_label(&self, event_id: Uuid, label: &SeatLabel) -> Result<Option<Seat>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM seats WHERE event_id = ?1 AND section = ?2 AND row_label = ?3 AND number = ?4",
            SEAT_COLUMNS
        ))?;

        let seat = stmt
            .query_row(
                params![event_id.to_string(), label.section, label.row, label.number],
                seat_from_row,
            )
            .optional()?;

        Ok(seat)
    }

    /// List the seat map of an event
    #[instrument(skip(self))]
    pub fn list_for_event(&self, event_id: Uuid) -> Result<Vec<Seat>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM seats WHERE event_id = ?1 ORDER BY section, row_label, number",
            SEAT_COLUMNS
        ))?;

        let seats = stmt
            .query_map(params![event_id.to_string()], seat_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(seats)
    }

    /// Count seats defined for an event
    pub fn count_for_event(&self, event_id: Uuid) -> Result<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM seats WHERE event_id = ?1",
            params![event_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count seats of an event in a given state
    pub fn count_in_state(&self, event_id: Uuid, state: &str) -> Result<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM seats WHERE event_id = ?1 AND state = ?2",
            params![event_id.to_string(), state],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Available -> Held. Returns false if the seat was not available.
    pub fn mark_held(
        &self,
        event_id: Uuid,
        seat_id: Uuid,
        hold_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE seats SET state = 'held', hold_id = ?1, hold_expires_at = ?2, ticket_id = NULL
             WHERE id = ?3 AND event_id = ?4 AND state = 'available'",
            params![
                hold_id.to_string(),
                format_datetime(&expires_at),
                seat_id.to_string(),
                event_id.to_string(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Held (by `hold_id`) -> Sold. Returns false if the hold no longer owns it.
    pub fn mark_sold(&self, seat_id: Uuid, hold_id: Uuid, ticket_id: Uuid) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE seats SET state = 'sold', hold_id = NULL, hold_expires_at = NULL, ticket_id = ?1
             WHERE id = ?2 AND state = 'held' AND hold_id = ?3",
            params![
                ticket_id.to_string(),
                seat_id.to_string(),
                hold_id.to_string(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Held (by `hold_id`) -> Available. Returns false if the hold no longer owns it.
    pub fn release_held(&self, seat_id: Uuid, hold_id: Uuid) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE seats SET state = 'available', hold_id = NULL, hold_expires_at = NULL
             WHERE id = ?1 AND state = 'held' AND hold_id = ?2",
            params![seat_id.to_string(), hold_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// Sold (to `ticket_id`) -> Available. Returns false if not sold to that ticket.
    pub fn release_sold(&self, seat_id: Uuid, ticket_id: Uuid) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE seats SET state = 'available', ticket_id = NULL
             WHERE id = ?1 AND state = 'sold' AND ticket_id = ?2",
            params![seat_id.to_string(), ticket_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// Pull the recorded hold deadline of held seats back to `until`
    pub fn clamp_hold_expiry(&self, event_id: Uuid, until: DateTime<Utc>) -> Result<usize> {
        let until = format_datetime(&until);
        let changed = self.conn.execute(
            "UPDATE seats SET hold_expires_at = ?2
             WHERE event_id = ?1 AND state = 'held' AND hold_expires_at > ?2",
            params![event_id.to_string(), until],
        )?;
        Ok(changed)
    }
}
