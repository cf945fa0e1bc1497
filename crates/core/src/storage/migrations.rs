//! Database migration system
//!
//! Tracks schema versions and applies migrations in order.

use rusqlite::Connection;
use tracing::{info, instrument};

use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema",
        sql: r#"
            -- Events
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                starts_at TEXT NOT NULL,
                capacity INTEGER NOT NULL CHECK (capacity > 0),
                seated INTEGER NOT NULL,
                base_price INTEGER NOT NULL CHECK (base_price >= 0),
                created_at TEXT NOT NULL
            );

            -- Seat ledger (seated events only)
            CREATE TABLE IF NOT EXISTS seats (
                id TEXT PRIMARY KEY,
                event_id TEXT NOT NULL,
                section TEXT NOT NULL,
                row_label TEXT NOT NULL,
                number INTEGER NOT NULL,
                multiplier REAL NOT NULL CHECK (multiplier > 0),
                state TEXT NOT NULL DEFAULT 'available'
                    CHECK (state IN ('available', 'held', 'sold')),
                hold_id TEXT,
                hold_expires_at TEXT,
                ticket_id TEXT,
                FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE,
                UNIQUE(event_id, section, row_label, number)
            );

            -- Capacity counter (unseated events only)
            CREATE TABLE IF NOT EXISTS capacity_slots (
                event_id TEXT PRIMARY KEY,
                total INTEGER NOT NULL,
                held INTEGER NOT NULL DEFAULT 0,
                sold INTEGER NOT NULL DEFAULT 0,
                CHECK (held >= 0 AND sold >= 0 AND sold + held <= total),
                FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE
            );

            -- Holds; seat_ids is a JSON array, NULL for general admission
            CREATE TABLE IF NOT EXISTS holds (
                id TEXT PRIMARY KEY,
                event_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                seat_ids TEXT,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'confirmed', 'released')),
                release_cause TEXT,
                finalized_at TEXT,
                CHECK (expires_at > created_at),
                FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE
            );

            -- Issued tickets; seat columns are NULL for general admission
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                event_id TEXT NOT NULL,
                hold_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                purchased_at TEXT NOT NULL,
                price INTEGER NOT NULL CHECK (price >= 0),
                code TEXT NOT NULL UNIQUE,
                used INTEGER NOT NULL DEFAULT 0,
                seat_id TEXT UNIQUE,
                seat_section TEXT,
                seat_row TEXT,
                seat_number INTEGER,
                FOREIGN KEY (event_id) REFERENCES events(id),
                FOREIGN KEY (seat_id) REFERENCES seats(id)
            );
        "#,
    },
    Migration {
        version: 2,
        description: "Add indexes for ledger and sweeper queries",
        sql: r#"
            -- Seat map lookups
            CREATE INDEX IF NOT EXISTS idx_seats_event ON seats(event_id);
            CREATE INDEX IF NOT EXISTS idx_seats_hold ON seats(hold_id);

            -- Sweeper scans active holds by deadline
            CREATE INDEX IF NOT EXISTS idx_holds_status_expires ON holds(status, expires_at);
            CREATE INDEX IF NOT EXISTS idx_holds_event ON holds(event_id, status);

            -- Ticket lookups
            CREATE INDEX IF NOT EXISTS idx_tickets_event ON tickets(event_id);
            CREATE INDEX IF NOT EXISTS idx_tickets_user ON tickets(user_id);

            -- Upcoming and date range listing
            CREATE INDEX IF NOT EXISTS idx_events_starts ON events(starts_at);
            CREATE INDEX IF NOT EXISTS idx_events_category ON events(category COLLATE NOCASE);
        "#,
    },
];

/// Initialize the migrations table
fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version
pub(super) fn get_current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Record that a migration was applied
fn record_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            super::parse::format_datetime(&chrono::Utc::now())
        ],
    )?;
    Ok(())
}

/// Run all pending migrations
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    init_migrations_table(conn)?;

    let current_version = get_current_version(conn)?;
    info!(current_version, "Checking for pending migrations");

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );

            conn.execute_batch(migration.sql)?;
            record_migration(conn, migration)?;

            info!(version = migration.version, "Migration complete");
        }
    }

    let new_version = get_current_version(conn)?;
    if new_version > current_version {
        info!(
            from = current_version,
            to = new_version,
            "Database schema updated"
        );
    }

    Ok(())
}
