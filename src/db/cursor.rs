//! Feed-cursor store
//!
//! Single-row resume point: the id of the most recently processed feed
//! event. Written inside the same transaction as that event's target and
//! entry writes, so a crash mid-batch re-processes the last event at worst.

use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::MannaError;

/// Latest processed event id, if any
pub fn get_cursor(conn: &Connection) -> Result<Option<String>, MannaError> {
    let cursor = conn
        .query_row("SELECT event_id FROM feed_cursor WHERE id = 1", [], |row| {
            row.get(0)
        })
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    debug!(cursor = ?cursor, "get_cursor");
    Ok(cursor)
}

/// Advance the cursor to the given event id
pub fn set_cursor(conn: &Connection, event_id: &str) -> Result<(), MannaError> {
    conn.execute(
        "INSERT INTO feed_cursor (id, event_id) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET event_id = excluded.event_id",
        params![event_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LedgerDb;

    #[test]
    fn test_cursor_roundtrip() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            assert_eq!(get_cursor(conn)?, None);

            set_cursor(conn, "t1")?;
            assert_eq!(get_cursor(conn)?.as_deref(), Some("t1"));

            set_cursor(conn, "t2")?;
            assert_eq!(get_cursor(conn)?.as_deref(), Some("t2"));
            Ok(())
        })
        .unwrap();
    }
}
