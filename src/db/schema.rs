//! Ledger schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::MannaError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), MannaError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new ledger schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating ledger schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        info!("Ledger schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, MannaError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), MannaError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), MannaError> {
    conn.execute_batch(LEDGER_SCHEMA)?;
    conn.execute_batch(INDEXES_SCHEMA)?;
    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), MannaError> {
    // Add migration steps here as schema evolves
    match from_version {
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Ledger table schema
const LEDGER_SCHEMA: &str = r#"
-- Content registered as reward-relevant.
-- event_id is NULL for records seeded without an originating event
-- (owner likes register the liked content before its author is known).
-- content_id may be NULL for anomalous id-less events; SQLite treats
-- NULLs as distinct, so those rows never collide on the unique pair.
CREATE TABLE IF NOT EXISTS targets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT UNIQUE,
    content_id TEXT,
    role TEXT NOT NULL,
    sender_key TEXT,
    UNIQUE (content_id, role)
);

-- Earned rewards, paid or pending.
-- settlement_id: NULL = unpaid, 'dailylimit' = terminal cap skip,
-- anything else = external transfer id. One event legitimately yields
-- up to three entries of distinct kinds, hence the pair uniqueness.
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL,
    sender_key TEXT NOT NULL,
    address TEXT NOT NULL,
    program_day INTEGER NOT NULL,
    target_content_id TEXT,
    reward_kind TEXT NOT NULL,
    amount INTEGER NOT NULL,
    settlement_id TEXT,
    memo TEXT,
    UNIQUE (event_id, reward_kind)
);

-- Resume point for the feed consumer, written in the same transaction
-- as the event's target/entry writes.
CREATE TABLE IF NOT EXISTS feed_cursor (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    event_id TEXT NOT NULL
);
"#;

/// Index definitions for the query shapes the engine uses
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_targets_content ON targets(content_id, role);

CREATE INDEX IF NOT EXISTS idx_entries_sender ON entries(sender_key);
CREATE INDEX IF NOT EXISTS idx_entries_day ON entries(program_day);
CREATE INDEX IF NOT EXISTS idx_entries_sender_day ON entries(sender_key, program_day);
CREATE INDEX IF NOT EXISTS idx_entries_settlement ON entries(settlement_id);
"#;
