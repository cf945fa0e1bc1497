//! Ticket model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SeatLabel;

/// What a ticket admits to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    /// Bound to one seat of a seated event
    Seated { seat_id: Uuid, label: SeatLabel },
    /// One unit of general admission capacity
    General,
}

impl Admission {
    pub fn seat_id(&self) -> Option<Uuid> {
        match self {
            Admission::Seated { seat_id, .. } => Some(*seat_id),
            Admission::General => None,
        }
    }
}

/// An issued admission right
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    /// Hold the ticket was minted from
    pub hold_id: Uuid,
    pub user_id: Uuid,
    pub purchased_at: DateTime<Utc>,
    /// Price in minor currency units
    pub price: i64,
    /// Globally unique redemption code
    pub code: String,
    pub used: bool,
    pub admission: Admission,
}

impl Ticket {
    /// Valid for entry: not yet used and the event hasn't passed
    pub fn is_valid(&self, event_start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        !self.used && now < event_start
    }
}
