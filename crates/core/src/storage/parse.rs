//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Error as SqlError;
use uuid::Uuid;

use crate::models::{HoldStatus, ReleaseCause, SeatState};

/// Format a DateTime for storage.
///
/// Fixed width with a `Z` suffix, so text comparison in SQL matches time order.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(column: usize, err: impl std::error::Error + Send + Sync + 'static) -> SqlError {
    SqlError::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn invalid_value(column: usize, what: &str, value: &str) -> SqlError {
    conversion_error(
        column,
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid {}: {}", what, value),
        ),
    )
}

/// Parse a UUID from a database string column
pub fn parse_uuid(s: &str) -> Result<Uuid, SqlError> {
    Uuid::parse_str(s).map_err(|e| conversion_error(0, e))
}

/// Parse an optional UUID from a database string column
pub fn parse_uuid_opt(s: Option<String>) -> Result<Option<Uuid>, SqlError> {
    s.map(|s| parse_uuid(&s)).transpose()
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(0, e))
}

/// Parse an optional DateTime from an RFC3339 string
pub fn parse_datetime_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>, SqlError> {
    s.map(|s| parse_datetime(&s)).transpose()
}

/// Parse a JSON array of UUIDs
pub fn parse_uuid_list(s: &str) -> Result<Vec<Uuid>, SqlError> {
    serde_json::from_str(s).map_err(|e| conversion_error(0, e))
}

/// Rebuild a seat state from its columns
pub fn seat_state_from_columns(
    state: &str,
    hold_id: Option<String>,
    hold_expires_at: Option<String>,
    ticket_id: Option<String>,
) -> Result<SeatState, SqlError> {
    match state {
        "available" => Ok(SeatState::Available),
        "held" => {
            let hold_id = parse_uuid_opt(hold_id)?
                .ok_or_else(|| invalid_value(0, "held seat", "missing hold_id"))?;
            let expires_at = parse_datetime_opt(hold_expires_at)?
                .ok_or_else(|| invalid_value(0, "held seat", "missing hold_expires_at"))?;
            Ok(SeatState::Held {
                hold_id,
                expires_at,
            })
        }
        "sold" => {
            let ticket_id = parse_uuid_opt(ticket_id)?
                .ok_or_else(|| invalid_value(0, "sold seat", "missing ticket_id"))?;
            Ok(SeatState::Sold { ticket_id })
        }
        other => Err(invalid_value(0, "seat state", other)),
    }
}

/// Split a hold status into its stored (status, release_cause) columns
pub fn hold_status_columns(status: HoldStatus) -> (&'static str, Option<&'static str>) {
    match status {
        HoldStatus::Active => ("active", None),
        HoldStatus::Confirmed => ("confirmed", None),
        HoldStatus::Released(cause) => ("released", Some(cause.as_str())),
    }
}

/// Rebuild a hold status from its columns
pub fn hold_status_from_columns(
    status: &str,
    cause: Option<String>,
) -> Result<HoldStatus, SqlError> {
    match (status, cause.as_deref()) {
        ("active", _) => Ok(HoldStatus::Active),
        ("confirmed", _) => Ok(HoldStatus::Confirmed),
        ("released", Some("expired")) => Ok(HoldStatus::Released(ReleaseCause::Expired)),
        ("released", Some("cancelled")) => Ok(HoldStatus::Released(ReleaseCause::Cancelled)),
        (other, cause) => Err(invalid_value(
            0,
            "hold status",
            &format!("{}/{}", other, cause.unwrap_or("-")),
        )),
    }
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_datetime_text_order_matches_time_order() {
        let whole = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
        let later = whole + Duration::microseconds(1);
        assert!(format_datetime(&whole) < format_datetime(&later));
        assert_eq!(format_datetime(&whole).len(), format_datetime(&later).len());
        assert_eq!(parse_datetime(&format_datetime(&later)).unwrap(), later);
    }

    #[test]
    fn test_hold_status_columns() {
        let status = HoldStatus::Released(ReleaseCause::Expired);
        let (name, cause) = hold_status_columns(status);
        let parsed = hold_status_from_columns(name, cause.map(String::from)).unwrap();
        assert_eq!(parsed, status);
        assert!(hold_status_from_columns("released", None).is_err());
    }

    #[test]
    fn test_held_seat_requires_hold_columns() {
        assert!(seat_state_from_columns("held", None, None, None).is_err());
        assert!(seat_state_from_columns("bogus", None, None, None).is_err());
        assert_eq!(
            seat_state_from_columns("available", None, None, None).unwrap(),
            SeatState::Available
        );
    }
}
