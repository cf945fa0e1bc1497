//! Hold model - a time-boxed provisional reservation

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// What a caller asks to reserve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeatSelection {
    /// Specific seats of a seated event
    Seats(Vec<Uuid>),
    /// A number of admissions to a general admission event
    Quantity(u32),
}

impl SeatSelection {
    /// Validate the selection against the event's seating mode and the
    /// per-hold maximum, producing the reservation a hold will own.
    pub fn into_reservation(self, seated: bool, max_units: u32) -> Result<Reservation> {
        match (self, seated) {
            (SeatSelection::Seats(ids), true) => {
                if ids.is_empty() {
                    return Err(Error::InvalidSelection("no seats requested".into()));
                }
                let mut unique = BTreeSet::new();
                for id in &ids {
                    if !unique.insert(*id) {
                        return Err(Error::InvalidSelection(format!(
                            "seat {} requested more than once",
                            id
                        )));
                    }
                }
                if unique.len() > max_units as usize {
                    return Err(Error::InvalidSelection(format!(
                        "at most {} seats per hold",
                        max_units
                    )));
                }
                Ok(Reservation::Seats(unique.into_iter().collect()))
            }
            (SeatSelection::Quantity(quantity), false) => {
                if quantity == 0 {
                    return Err(Error::InvalidSelection("quantity must be positive".into()));
                }
                if quantity > max_units {
                    return Err(Error::InvalidSelection(format!(
                        "at most {} admissions per hold",
                        max_units
                    )));
                }
                Ok(Reservation::GeneralAdmission { quantity })
            }
            (SeatSelection::Seats(_), false) => Err(Error::InvalidSelection(
                "event has no numbered seats".into(),
            )),
            (SeatSelection::Quantity(_), true) => Err(Error::InvalidSelection(
                "event requires specific seats".into(),
            )),
        }
    }
}

/// Inventory owned by a hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reservation {
    /// Seat ids, sorted and distinct
    Seats(Vec<Uuid>),
    GeneralAdmission { quantity: u32 },
}

impl Reservation {
    /// Number of admissions covered
    pub fn units(&self) -> u32 {
        match self {
            Reservation::Seats(ids) => ids.len() as u32,
            Reservation::GeneralAdmission { quantity } => *quantity,
        }
    }

    pub fn seat_ids(&self) -> &[Uuid] {
        match self {
            Reservation::Seats(ids) => ids,
            Reservation::GeneralAdmission { .. } => &[],
        }
    }
}

/// Why a hold stopped owning its inventory without a sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseCause {
    /// Explicitly released by the holder
    Cancelled,
    /// Deadline passed before confirmation
    Expired,
}

impl ReleaseCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseCause::Cancelled => "cancelled",
            ReleaseCause::Expired => "expired",
        }
    }
}

/// Hold lifecycle: `Active` moves to exactly one terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldStatus {
    Active,
    Confirmed,
    Released(ReleaseCause),
}

impl HoldStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HoldStatus::Active)
    }
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldStatus::Active => write!(f, "active"),
            HoldStatus::Confirmed => write!(f, "confirmed"),
            HoldStatus::Released(cause) => write!(f, "released ({})", cause.as_str()),
        }
    }
}

/// A provisional reservation against an event's inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub reservation: Reservation,
    pub status: HoldStatus,
    /// When the hold reached its terminal state
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Hold {
    pub fn new(
        event_id: Uuid,
        user_id: Uuid,
        reservation: Reservation,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            user_id,
            created_at,
            expires_at,
            reservation,
            status: HoldStatus::Active,
            finalized_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == HoldStatus::Active
    }

    /// Active but past its deadline: must be treated as expired
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now >= self.expires_at
    }
}
