//! Hold storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{
    format_datetime, hold_status_columns, hold_status_from_columns, parse_datetime,
    parse_datetime_opt, parse_uuid, parse_uuid_list, OptionalExt,
};
use crate::error::Result;
use crate::models::{Hold, HoldStatus, Reservation};

const HOLD_COLUMNS: &str =
    "id, event_id, user_id, created_at, expires_at, seat_ids, quantity, status, release_cause, finalized_at";

fn hold_from_row(row: &Row<'_>) -> rusqlite::Result<Hold> {
    let reservation = match row.get::<_, Option<String>>(5)? {
        Some(json) => Reservation::Seats(parse_uuid_list(&json)?),
        None => Reservation::GeneralAdmission {
            quantity: row.get(6)?,
        },
    };

    Ok(Hold {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        event_id: parse_uuid(&row.get::<_, String>(1)?)?,
        user_id: parse_uuid(&row.get::<_, String>(2)?)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?)?,
        expires_at: parse_datetime(&row.get::<_, String>(4)?)?,
        reservation,
        status: hold_status_from_columns(&row.get::<_, String>(7)?, row.get(8)?)?,
        finalized_at: parse_datetime_opt(row.get::<_, Option<String>>(9)?)?,
    })
}

pub struct HoldStore<'a> {
    conn: &'a Connection,
}

impl<'a> HoldStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Record a new active hold
    #[instrument(skip(self, hold), fields(hold_id = %hold.id, event_id = %hold.event_id))]
    pub fn create(&self, hold: &Hold) -> Result<()> {
        let seat_ids = match &hold.reservation {
            Reservation::Seats(ids) => Some(serde_json::to_string(ids)?),
            Reservation::GeneralAdmission { .. } => None,
        };
        let (status, cause) = hold_status_columns(hold.status);

        self.conn.execute(
            "INSERT INTO holds (id, event_id, user_id, created_at, expires_at, seat_ids, quantity, status, release_cause, finalized_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                hold.id.to_string(),
                hold.event_id.to_string(),
                hold.user_id.to_string(),
                format_datetime(&hold.created_at),
                format_datetime(&hold.expires_at),
                seat_ids,
                hold.reservation.units(),
                status,
                cause,
                hold.finalized_at.as_ref().map(format_datetime),
            ],
        )?;
        Ok(())
    }

    /// Find hold by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Hold>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM holds WHERE id = ?1", HOLD_COLUMNS))?;

        let hold = stmt
            .query_row(params![id.to_string()], hold_from_row)
            .optional()?;

        Ok(hold)
    }

    /// Move an active hold to a terminal status.
    /// Returns false if the hold was no longer active.
    #[instrument(skip(self))]
    pub fn finalize(&self, hold_id: Uuid, status: HoldStatus, at: DateTime<Utc>) -> Result<bool> {
        let (status, cause) = hold_status_columns(status);
        let changed = self.conn.execute(
            "UPDATE holds SET status = ?1, release_cause = ?2, finalized_at = ?3
             WHERE id = ?4 AND status = 'active'",
            params![status, cause, format_datetime(&at), hold_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// Active holds past their deadline across all events, oldest first
    #[instrument(skip(self))]
    pub fn list_overdue(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Hold>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM holds WHERE status = 'active' AND expires_at <= ?1
             ORDER BY expires_at LIMIT ?2",
            HOLD_COLUMNS
        ))?;

        let holds = stmt
            .query_map(params![format_datetime(&now), limit], hold_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(holds)
    }

    /// Active holds past their deadline for one event
    pub fn list_overdue_for_event(&self, event_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Hold>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM holds WHERE event_id = ?1 AND status = 'active' AND expires_at <= ?2
             ORDER BY expires_at",
            HOLD_COLUMNS
        ))?;

        let holds = stmt
            .query_map(
                params![event_id.to_string(), format_datetime(&now)],
                hold_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(holds)
    }

    /// Units reserved by active holds of an event, split into (live, overdue)
    pub fn active_units(&self, event_id: Uuid, now: DateTime<Utc>) -> Result<(u32, u32)> {
        let units = self.conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN expires_at > ?2 THEN quantity ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN expires_at <= ?2 THEN quantity ELSE 0 END), 0)
             FROM holds WHERE event_id = ?1 AND status = 'active'",
            params![event_id.to_string(), format_datetime(&now)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(units)
    }

    /// Units reserved by all active holds of an event, overdue or not
    pub fn held_units(&self, event_id: Uuid) -> Result<u32> {
        let units = self.conn.query_row(
            "SELECT COALESCE(SUM(quantity), 0) FROM holds WHERE event_id = ?1 AND status = 'active'",
            params![event_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(units)
    }

    /// Pull the deadline of active holds ending after `until` back to it
    #[instrument(skip(self))]
    pub fn clamp_expiry(&self, event_id: Uuid, until: DateTime<Utc>) -> Result<usize> {
        let until = format_datetime(&until);
        let changed = self.conn.execute(
            "UPDATE holds SET expires_at = ?2
             WHERE event_id = ?1 AND status = 'active' AND expires_at > ?2",
            params![event_id.to_string(), until],
        )?;
        Ok(changed)
    }

    /// Holds placed by a user, newest first
    #[instrument(skip(self))]
    pub fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Hold>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM holds WHERE user_id = ?1 ORDER BY created_at DESC",
            HOLD_COLUMNS
        ))?;

        let holds = stmt
            .query_map(params![user_id.to_string()], hold_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(holds)
    }
}
