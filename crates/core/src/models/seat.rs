//! Seat model - numbered inventory for seated events

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Human-readable seat position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeatLabel {
    pub section: String,
    pub row: String,
    pub number: u32,
}

impl SeatLabel {
    pub fn new(section: impl Into<String>, row: impl Into<String>, number: u32) -> Self {
        Self {
            section: section.into(),
            row: row.into(),
            number,
        }
    }
}

impl fmt::Display for SeatLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}{}", self.section, self.row, self.number)
    }
}

/// Ledger state of a single seat.
///
/// A released seat goes straight back to `Available`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeatState {
    Available,
    Held {
        hold_id: Uuid,
        expires_at: DateTime<Utc>,
    },
    Sold {
        ticket_id: Uuid,
    },
}

impl SeatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatState::Available => "available",
            SeatState::Held { .. } => "held",
            SeatState::Sold { .. } => "sold",
        }
    }

    /// State as seen at `now`: a hold past its deadline no longer owns the seat
    pub fn effective(self, now: DateTime<Utc>) -> Self {
        match self {
            SeatState::Held { expires_at, .. } if now >= expires_at => SeatState::Available,
            other => other,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SeatState::Available)
    }
}

/// A numbered seat belonging to an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub event_id: Uuid,
    pub label: SeatLabel,
    /// Applied to the event base price
    pub multiplier: f64,
    pub state: SeatState,
}

impl Seat {
    /// Price in minor units for an event base price
    pub fn price_for(&self, base_price: i64) -> i64 {
        (base_price as f64 * self.multiplier).round() as i64
    }
}

/// Parameters for adding a seat to an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSeat {
    pub label: SeatLabel,
    pub multiplier: f64,
}

impl NewSeat {
    pub fn new(section: impl Into<String>, row: impl Into<String>, number: u32) -> Self {
        Self {
            label: SeatLabel::new(section, row, number),
            multiplier: 1.0,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.section.trim().is_empty() || self.label.row.trim().is_empty() {
            return Err(Error::InvalidOperation(
                "Seat section and row cannot be empty".into(),
            ));
        }
        if self.label.number == 0 {
            return Err(Error::InvalidOperation(
                "Seat number must be greater than zero".into(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(Error::InvalidOperation(
                "Price multiplier must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn into_seat(self, event_id: Uuid) -> Seat {
        Seat {
            id: Uuid::new_v4(),
            event_id,
            label: self.label,
            multiplier: self.multiplier,
            state: SeatState::Available,
        }
    }
}
