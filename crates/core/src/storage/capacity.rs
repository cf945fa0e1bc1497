//! Capacity counter storage for general admission events

use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::CapacitySlot;

pub struct CapacityStore<'a> {
    conn: &'a Connection,
}

impl<'a> CapacityStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create the counter row for an event
    #[instrument(skip(self))]
    pub fn create(&self, event_id: Uuid, total: u32) -> Result<()> {
        self.conn.execute(
            "INSERT INTO capacity_slots (event_id, total, held, sold) VALUES (?1, ?2, 0, 0)",
            params![event_id.to_string(), total],
        )?;
        Ok(())
    }

    /// Get the counters for an event
    pub fn get(&self, event_id: Uuid) -> Result<Option<CapacitySlot>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, total, held, sold FROM capacity_slots WHERE event_id = ?1",
        )?;

        let slot = stmt
            .query_row(params![event_id.to_string()], |row| {
                Ok(CapacitySlot {
                    event_id: parse_uuid(&row.get::<_, String>(0)?)?,
                    total: row.get(1)?,
                    held: row.get(2)?,
                    sold: row.get(3)?,
                })
            })
            .optional()?;

        Ok(slot)
    }

    /// Change the total. Returns false if it would drop below sold + held.
    pub fn set_total(&self, event_id: Uuid, total: u32) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE capacity_slots SET total = ?1 WHERE event_id = ?2 AND sold + held <= ?1",
            params![total, event_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// Remove the counter row (event switched to numbered seats)
    pub fn delete(&self, event_id: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM capacity_slots WHERE event_id = ?1",
            params![event_id.to_string()],
        )?;
        Ok(())
    }

    /// held += n, only if sold + held + n <= total
    pub fn try_hold(&self, event_id: Uuid, n: u32) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE capacity_slots SET held = held + ?1
             WHERE event_id = ?2 AND sold + held + ?1 <= total",
            params![n, event_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// held -= n; sold += n
    pub fn confirm(&self, event_id: Uuid, n: u32) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE capacity_slots SET held = held - ?1, sold = sold + ?1
             WHERE event_id = ?2 AND held >= ?1",
            params![n, event_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// held -= n
    pub fn release_held(&self, event_id: Uuid, n: u32) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE capacity_slots SET held = held - ?1 WHERE event_id = ?2 AND held >= ?1",
            params![n, event_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    /// sold -= n
    pub fn release_sold(&self, event_id: Uuid, n: u32) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE capacity_slots SET sold = sold - ?1 WHERE event_id = ?2 AND sold >= ?1",
            params![n, event_id.to_string()],
        )?;
        Ok(changed == 1)
    }
}
