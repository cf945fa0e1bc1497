//! Event storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{format_datetime, parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::Event;

const EVENT_COLUMNS: &str =
    "id, name, starts_at, capacity, seated, base_price, created_at, description, location, category";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        name: row.get(1)?,
        starts_at: parse_datetime(&row.get::<_, String>(2)?)?,
        capacity: row.get(3)?,
        seated: row.get::<_, i32>(4)? != 0,
        base_price: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?)?,
        description: row.get(7)?,
        location: row.get(8)?,
        category: row.get(9)?,
    })
}

pub struct EventStore<'a> {
    conn: &'a Connection,
}

impl<'a> EventStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new event
    #[instrument(skip(self, event), fields(event_id = %event.id, name = %event.name))]
    pub fn create(&self, event: &Event) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (id, name, starts_at, capacity, seated, base_price, created_at,
                                 description, location, category)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.id.to_string(),
                event.name,
                format_datetime(&event.starts_at),
                event.capacity,
                event.seated as i32,
                event.base_price,
                format_datetime(&event.created_at),
                event.description,
                event.location,
                event.category,
            ],
        )?;
        Ok(())
    }

    /// Find event by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Event>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS))?;

        let event = stmt
            .query_row(params![id.to_string()], event_from_row)
            .optional()?;

        Ok(event)
    }

    /// Update mutable event fields
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub fn update(&self, event: &Event) -> Result<()> {
        self.conn.execute(
            "UPDATE events SET name = ?1, starts_at = ?2, capacity = ?3, seated = ?4,
                               description = ?5, location = ?6, category = ?7
             WHERE id = ?8",
            params![
                event.name,
                format_datetime(&event.starts_at),
                event.capacity,
                event.seated as i32,
                event.description,
                event.location,
                event.category,
                event.id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Delete event (seats, capacity and holds cascade)
    #[instrument(skip(self))]
    pub fn delete(&self, event_id: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM events WHERE id = ?1",
            params![event_id.to_string()],
        )?;
        Ok(())
    }

    /// List events that have not started yet, soonest first
    #[instrument(skip(self))]
    pub fn list_upcoming(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM events WHERE starts_at > ?1 ORDER BY starts_at, name",
            EVENT_COLUMNS
        ))?;

        let events = stmt
            .query_map(params![format_datetime(&now)], event_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Events whose name, description or location contains `term`,
    /// ignoring ASCII case
    #[instrument(skip(self))]
    pub fn search(&self, term: &str) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM events
             WHERE instr(lower(name), lower(?1)) > 0
                OR instr(lower(description), lower(?1)) > 0
                OR instr(lower(location), lower(?1)) > 0
             ORDER BY starts_at, name",
            EVENT_COLUMNS
        ))?;

        let events = stmt
            .query_map(params![term], event_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Events in a category, ignoring ASCII case
    #[instrument(skip(self))]
    pub fn list_by_category(&self, category: &str) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM events WHERE category = ?1 COLLATE NOCASE ORDER BY starts_at, name",
            EVENT_COLUMNS
        ))?;

        let events = stmt
            .query_map(params![category], event_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Events starting within `[from, to]`
    #[instrument(skip(self))]
    pub fn list_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM events WHERE starts_at >= ?1 AND starts_at <= ?2 ORDER BY starts_at, name",
            EVENT_COLUMNS
        ))?;

        let events = stmt
            .query_map(
                params![format_datetime(&from), format_datetime(&to)],
                event_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }
}
