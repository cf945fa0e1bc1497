//! Event model - a timed occasion with bounded admission

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// An event tickets are sold for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub location: String,
    /// Free-form grouping used for browsing, e.g. "music"
    pub category: String,
    pub starts_at: DateTime<Utc>,
    /// Maximum number of admissions (seats for seated events)
    pub capacity: u32,
    /// Inventory is individually numbered seats rather than a bare count
    pub seated: bool,
    /// Base price in minor currency units
    pub base_price: i64,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.starts_at
    }
}

/// Parameters for creating an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub name: String,
    pub description: String,
    pub location: String,
    pub category: String,
    pub starts_at: DateTime<Utc>,
    pub capacity: u32,
    pub seated: bool,
    pub base_price: i64,
}

impl NewEvent {
    /// An event sold by numbered seat
    pub fn seated(name: impl Into<String>, starts_at: DateTime<Utc>, capacity: u32, base_price: i64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            location: String::new(),
            category: String::new(),
            starts_at,
            capacity,
            seated: true,
            base_price,
        }
    }

    /// A general admission event sold by quantity
    pub fn general(name: impl Into<String>, starts_at: DateTime<Utc>, capacity: u32, base_price: i64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            location: String::new(),
            category: String::new(),
            starts_at,
            capacity,
            seated: false,
            base_price,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidOperation("Event name cannot be empty".into()));
        }
        if self.starts_at <= now {
            return Err(Error::InvalidOperation(
                "Event start time must be in the future".into(),
            ));
        }
        if self.capacity == 0 {
            return Err(Error::InvalidOperation(
                "Event capacity must be greater than zero".into(),
            ));
        }
        if self.base_price < 0 {
            return Err(Error::InvalidOperation(
                "Base price cannot be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn into_event(self, now: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            location: self.location.trim().to_string(),
            category: self.category.trim().to_string(),
            starts_at: self.starts_at,
            capacity: self.capacity,
            seated: self.seated,
            base_price: self.base_price,
            created_at: now,
        }
    }
}

/// Changes to an existing event. `None` leaves a field untouched.
///
/// Start time, capacity and seating mode are frozen after the first sale;
/// the descriptive fields never are.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub capacity: Option<u32>,
    pub seated: Option<bool>,
}

impl EventUpdate {
    /// Does this update touch fields that are frozen after the first sale?
    pub fn touches_inventory(&self, event: &Event) -> bool {
        self.starts_at.is_some_and(|t| t != event.starts_at)
            || self.capacity.is_some_and(|c| c != event.capacity)
            || self.seated.is_some_and(|s| s != event.seated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_validate_rejects_past_start() {
        let now = Utc::now();
        let event = NewEvent::general("Gig", now - Duration::hours(1), 10, 1000);
        assert!(matches!(
            event.validate(now),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_capacity_and_negative_price() {
        let now = Utc::now();
        let start = now + Duration::days(1);
        assert!(NewEvent::general("Gig", start, 0, 1000).validate(now).is_err());
        assert!(NewEvent::general("Gig", start, 10, -1).validate(now).is_err());
        assert!(NewEvent::general("  ", start, 10, 0).validate(now).is_err());
        assert!(NewEvent::seated("Gig", start, 10, 0).validate(now).is_ok());
    }

    #[test]
    fn test_has_started_at_boundary() {
        let now = Utc::now();
        let event = NewEvent::general("Gig", now + Duration::hours(1), 5, 0).into_event(now);
        assert!(!event.has_started(now));
        assert!(event.has_started(event.starts_at));
    }

    #[test]
    fn test_descriptive_fields_trimmed() {
        let now = Utc::now();
        let event = NewEvent::general("Gig", now + Duration::hours(1), 5, 0)
            .with_description(" Late set ")
            .with_location("Pier 9 ")
            .with_category(" music")
            .into_event(now);
        assert_eq!(event.description, "Late set");
        assert_eq!(event.location, "Pier 9");
        assert_eq!(event.category, "music");

        let retag = EventUpdate {
            category: Some("jazz".into()),
            ..Default::default()
        };
        assert!(!retag.touches_inventory(&event));
    }

    #[test]
    fn test_update_touches_inventory() {
        let now = Utc::now();
        let event = NewEvent::seated("Gig", now + Duration::hours(1), 5, 0).into_event(now);

        let rename = EventUpdate {
            name: Some("Renamed".into()),
            ..Default::default()
        };
        assert!(!rename.touches_inventory(&event));

        let same_capacity = EventUpdate {
            capacity: Some(5),
            ..Default::default()
        };
        assert!(!same_capacity.touches_inventory(&event));

        let grow = EventUpdate {
            capacity: Some(6),
            ..Default::default()
        };
        assert!(grow.touches_inventory(&event));
    }
}
