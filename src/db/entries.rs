//! Ledger-entry store
//!
//! One row per earned reward. Rows are created once and only their
//! `settlement_id` is ever mutated, exactly once, by the distributor.

use rusqlite::{params, Connection, Row};
use serde::Serialize;
use tracing::debug;

use crate::error::MannaError;

/// Terminal settlement marker for entries skipped by the daily cap.
/// Never retried.
pub const DAILY_LIMIT_SENTINEL: &str = "dailylimit";

/// Ledger entry row from the database
#[derive(Debug, Clone, Serialize)]
pub struct EntryRow {
    pub id: i64,
    pub event_id: String,
    pub sender_key: String,
    pub address: String,
    pub program_day: i64,
    pub target_content_id: Option<String>,
    pub reward_kind: String,
    pub amount: i64,
    pub settlement_id: Option<String>,
    pub memo: Option<String>,
}

impl EntryRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            event_id: row.get("event_id")?,
            sender_key: row.get("sender_key")?,
            address: row.get("address")?,
            program_day: row.get("program_day")?,
            target_content_id: row.get("target_content_id")?,
            reward_kind: row.get("reward_kind")?,
            amount: row.get("amount")?,
            settlement_id: row.get("settlement_id")?,
            memo: row.get("memo")?,
        })
    }
}

/// Input for creating a ledger entry
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub event_id: String,
    pub sender_key: String,
    pub address: String,
    pub program_day: i64,
    pub target_content_id: Option<String>,
    pub reward_kind: String,
    pub amount: i64,
    pub memo: Option<String>,
}

/// Persist-or-skip insert.
///
/// Entries with amount <= 0 are never persisted (a suppressed kind must stay
/// invisible to future bonus checks). A unique conflict on
/// `(event_id, reward_kind)` means the event was replayed and the entry is
/// already applied. Both cases report `false`.
pub fn insert_entry(conn: &Connection, entry: &NewEntry) -> Result<bool, MannaError> {
    let persisted = if entry.amount <= 0 {
        false
    } else {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO entries
             (event_id, sender_key, address, program_day, target_content_id,
              reward_kind, amount, memo)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.event_id,
                entry.sender_key,
                entry.address,
                entry.program_day,
                entry.target_content_id,
                entry.reward_kind,
                entry.amount,
                entry.memo,
            ],
        )?;
        changed > 0
    };

    debug!(
        kind = %entry.reward_kind,
        amount = entry.amount,
        persisted,
        "insert_entry"
    );

    Ok(persisted)
}

/// Total entries ever persisted for a sender (any day, any kind)
pub fn count_for_sender(conn: &Connection, sender_key: &str) -> Result<i64, MannaError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entries WHERE sender_key = ?1",
        params![sender_key],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Entries persisted for a sender on a given day, excluding one kind.
///
/// The first-daily check excludes `FIRST_EVER` so the one-time bonus inserted
/// moments earlier does not mask the daily bonus.
pub fn count_for_sender_day(
    conn: &Connection,
    sender_key: &str,
    day: i64,
    exclude_kind: &str,
) -> Result<i64, MannaError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entries
         WHERE sender_key = ?1 AND program_day = ?2 AND reward_kind != ?3",
        params![sender_key, day, exclude_kind],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Unsettled entries for a day, ordered by sender key (id as tiebreak) so a
/// distribution pass is deterministic.
pub fn unsettled_for_day(conn: &Connection, day: i64) -> Result<Vec<EntryRow>, MannaError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM entries
         WHERE program_day = ?1 AND settlement_id IS NULL
         ORDER BY sender_key ASC, id ASC",
    )?;

    let rows = stmt
        .query_map(params![day], |row| EntryRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Confirmed total for a sender on a day: sum over entries with a real
/// transfer id (non-null, non-sentinel). `FIRST_EVER` does not consume
/// daily cap and is excluded.
pub fn confirmed_day_sum(
    conn: &Connection,
    sender_key: &str,
    day: i64,
) -> Result<i64, MannaError> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM entries
         WHERE sender_key = ?1 AND program_day = ?2
           AND reward_kind != 'FIRST_EVER'
           AND settlement_id IS NOT NULL AND settlement_id != ?3",
        params![sender_key, day, DAILY_LIMIT_SENTINEL],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Total already distributed on a day across all senders
pub fn distributed_day_sum(conn: &Connection, day: i64) -> Result<i64, MannaError> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM entries
         WHERE program_day = ?1
           AND settlement_id IS NOT NULL AND settlement_id != ?2",
        params![day, DAILY_LIMIT_SENTINEL],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Record a settlement outcome. Compare-and-set: only transitions from
/// NULL, so a lost race or a replayed pass mutates nothing.
pub fn settle(conn: &Connection, entry_id: i64, settlement_id: &str) -> Result<bool, MannaError> {
    let changed = conn.execute(
        "UPDATE entries SET settlement_id = ?1
         WHERE id = ?2 AND settlement_id IS NULL",
        params![settlement_id, entry_id],
    )?;
    Ok(changed > 0)
}

/// All entries for a sender, oldest first (diagnostics and tests)
pub fn entries_for_sender(conn: &Connection, sender_key: &str) -> Result<Vec<EntryRow>, MannaError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM entries WHERE sender_key = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt
        .query_map(params![sender_key], |row| EntryRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LedgerDb;

    fn entry(event_id: &str, sender: &str, day: i64, kind: &str, amount: i64) -> NewEntry {
        NewEntry {
            event_id: event_id.to_string(),
            sender_key: sender.to_string(),
            address: format!("0x{}", sender),
            program_day: day,
            target_content_id: Some("p1".to_string()),
            reward_kind: kind.to_string(),
            amount,
            memo: None,
        }
    }

    #[test]
    fn test_zero_amount_never_persisted() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            assert!(!insert_entry(conn, &entry("t1", "alice", 1, "LIKED", 0))?);
            assert_eq!(count_for_sender(conn, "alice")?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_replay_insert_reports_false() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            assert!(insert_entry(conn, &entry("t1", "alice", 1, "COMMENT", 100))?);
            assert!(!insert_entry(conn, &entry("t1", "alice", 1, "COMMENT", 100))?);
            // Same event, different kind is legitimate (bonus entries)
            assert!(insert_entry(conn, &entry("t1", "alice", 1, "FIRST_EVER", 300))?);
            assert_eq!(count_for_sender(conn, "alice")?, 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_confirmed_day_sum_excludes_sentinel_and_first_ever() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_entry(conn, &entry("t1", "alice", 1, "COMMENT", 100))?;
            insert_entry(conn, &entry("t2", "alice", 1, "LIKE", 20))?;
            insert_entry(conn, &entry("t3", "alice", 1, "FIRST_EVER", 300))?;
            insert_entry(conn, &entry("t4", "alice", 1, "LIKE", 20))?;

            // Settle: t1 confirmed, t2 capped, t3 confirmed, t4 left unsettled
            assert!(settle(conn, 1, "0xaaa")?);
            assert!(settle(conn, 2, DAILY_LIMIT_SENTINEL)?);
            assert!(settle(conn, 3, "0xbbb")?);

            assert_eq!(confirmed_day_sum(conn, "alice", 1)?, 100);
            assert_eq!(confirmed_day_sum(conn, "alice", 2)?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_settle_is_compare_and_set() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_entry(conn, &entry("t1", "alice", 1, "COMMENT", 100))?;
            assert!(settle(conn, 1, "0xaaa")?);
            // Already settled: the second write is refused
            assert!(!settle(conn, 1, "0xbbb")?);

            let rows = unsettled_for_day(conn, 1)?;
            assert!(rows.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_unsettled_ordered_by_sender() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_entry(conn, &entry("t1", "carol", 1, "LIKE", 20))?;
            insert_entry(conn, &entry("t2", "alice", 1, "COMMENT", 100))?;
            insert_entry(conn, &entry("t3", "bob", 2, "LIKE", 20))?;

            let rows = unsettled_for_day(conn, 1)?;
            let senders: Vec<_> = rows.iter().map(|r| r.sender_key.as_str()).collect();
            assert_eq!(senders, vec!["alice", "carol"]);
            Ok(())
        })
        .unwrap();
    }
}
