//! SQLite ledger database
//!
//! Persistent record of reward-relevant content (targets), earned rewards
//! (entries) and the feed cursor. Pure data access; the business rules live
//! in the classifier, resolver and distributor.
//!
//! ## Tables
//!
//! - `targets` - content registered as reward-relevant, tagged by role
//! - `entries` - earned rewards, paid or pending
//! - `feed_cursor` - single-row resume point for the feed consumer

pub mod schema;
pub mod targets;
pub mod entries;
pub mod cursor;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::MannaError;

/// SQLite database holding the reward ledger
pub struct LedgerDb {
    conn: Mutex<Connection>,
}

impl LedgerDb {
    /// Open or create the ledger database
    pub fn open(db_path: &Path) -> Result<Self, MannaError> {
        info!("Opening ledger database at {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, MannaError> {
        debug!("Opening in-memory ledger database");

        let conn = Connection::open_in_memory()?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), MannaError> {
        self.with_conn(|conn| schema::init_schema(conn))
    }

    /// Run a read operation against the connection.
    ///
    /// The lock must not be held across an await point; callers finish all
    /// database work before suspending.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, MannaError>
    where
        F: FnOnce(&Connection) -> Result<T, MannaError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| MannaError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run a write operation with exclusive access (required for transactions)
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, MannaError>
    where
        F: FnOnce(&mut Connection) -> Result<T, MannaError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| MannaError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, MannaError> {
        self.with_conn(|conn| {
            let target_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM targets", [], |row| row.get(0))?;

            let entry_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;

            let unsettled_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entries WHERE settlement_id IS NULL",
                [],
                |row| row.get(0),
            )?;

            let earned_total: i64 = conn.query_row(
                "SELECT COALESCE(SUM(amount), 0) FROM entries",
                [],
                |row| row.get(0),
            )?;

            Ok(DbStats {
                target_count: target_count as u64,
                entry_count: entry_count as u64,
                unsettled_count: unsettled_count as u64,
                earned_total,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub target_count: u64,
    pub entry_count: u64,
    pub unsettled_count: u64,
    pub earned_total: i64,
}

// Re-exports
pub use entries::{EntryRow, NewEntry, DAILY_LIMIT_SENTINEL};
pub use targets::TargetRow;
