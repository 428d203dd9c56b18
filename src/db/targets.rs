//! Target-record store
//!
//! Targets mark content as reward-relevant: either authored by an owner, or
//! authored by anyone but liked by an owner. Records are inserted once and
//! only ever upgraded in place (a `user` record gains its author's event id
//! and sender key when the matching comment materializes).

use rusqlite::{params, Connection, Row};
use serde::Serialize;
use tracing::debug;

use crate::classifier::{Role, TargetReg};
use crate::error::MannaError;

/// Target row from the database
#[derive(Debug, Clone, Serialize)]
pub struct TargetRow {
    pub id: i64,
    pub event_id: Option<String>,
    pub content_id: Option<String>,
    pub role: String,
    pub sender_key: Option<String>,
}

impl TargetRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            event_id: row.get("event_id")?,
            content_id: row.get("content_id")?,
            role: row.get("role")?,
            sender_key: row.get("sender_key")?,
        })
    }
}

/// Insert a target record, reporting whether a row was actually written.
///
/// A unique conflict (replayed event id, or the `(content_id, role)` pair
/// already registered) means "already applied" and reports `false`.
pub fn insert_target(conn: &Connection, reg: &TargetReg) -> Result<bool, MannaError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO targets (event_id, content_id, role, sender_key)
         VALUES (?1, ?2, ?3, ?4)",
        params![reg.event_id, reg.content_id, reg.role.as_str(), reg.sender_key],
    )?;

    debug!(
        content_id = ?reg.content_id,
        role = reg.role.as_str(),
        inserted = changed > 0,
        "insert_target"
    );

    Ok(changed > 0)
}

/// Does a target exist for this `(content_id, role)` pair?
pub fn is_target(conn: &Connection, content_id: &str, role: Role) -> Result<bool, MannaError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM targets WHERE content_id = ?1 AND role = ?2",
        params![content_id, role.as_str()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Attach the authoring event and sender key to a `user`-role target.
///
/// Called when the comment an owner liked finally shows up in the feed.
/// Idempotent: replaying the same comment rewrites identical values.
pub fn upgrade_user_target(
    conn: &Connection,
    content_id: &str,
    event_id: &str,
    sender_key: &str,
) -> Result<bool, MannaError> {
    let changed = conn.execute(
        "UPDATE targets SET event_id = ?1, sender_key = ?2
         WHERE content_id = ?3 AND role = 'user'",
        params![event_id, sender_key, content_id],
    )?;
    Ok(changed > 0)
}

/// Fetch a target by `(content_id, role)`
pub fn get_target(
    conn: &Connection,
    content_id: &str,
    role: Role,
) -> Result<Option<TargetRow>, MannaError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM targets WHERE content_id = ?1 AND role = ?2 LIMIT 1",
    )?;
    let mut rows = stmt.query(params![content_id, role.as_str()])?;

    match rows.next()? {
        Some(row) => Ok(Some(TargetRow::from_row(row)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LedgerDb;

    fn owner_reg(event_id: &str, content_id: &str) -> TargetReg {
        TargetReg {
            event_id: Some(event_id.to_string()),
            content_id: Some(content_id.to_string()),
            role: Role::Owner,
            sender_key: Some("owner-key".to_string()),
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            assert!(insert_target(conn, &owner_reg("t1", "p1"))?);
            assert!(is_target(conn, "p1", Role::Owner)?);
            assert!(!is_target(conn, "p1", Role::User)?);
            assert!(!is_target(conn, "p2", Role::Owner)?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_duplicate_insert_reports_false() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            assert!(insert_target(conn, &owner_reg("t1", "p1"))?);
            // Same event replayed
            assert!(!insert_target(conn, &owner_reg("t1", "p1"))?);
            // Different event, same (content_id, role) pair
            assert!(!insert_target(conn, &owner_reg("t2", "p1"))?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_idless_registrations_do_not_collide() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let anon = TargetReg {
                event_id: None,
                content_id: None,
                role: Role::Owner,
                sender_key: Some("owner-key".to_string()),
            };
            // NULL content ids are distinct under the unique constraint
            assert!(insert_target(conn, &anon)?);
            assert!(insert_target(conn, &anon)?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_upgrade_user_target() {
        let db = LedgerDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let seeded = TargetReg {
                event_id: None,
                content_id: Some("c1".to_string()),
                role: Role::User,
                sender_key: None,
            };
            assert!(insert_target(conn, &seeded)?);

            assert!(upgrade_user_target(conn, "c1", "t9", "user-key")?);
            let row = get_target(conn, "c1", Role::User)?.unwrap();
            assert_eq!(row.event_id.as_deref(), Some("t9"));
            assert_eq!(row.sender_key.as_deref(), Some("user-key"));

            // No user target for unknown content
            assert!(!upgrade_user_target(conn, "c2", "t9", "user-key")?);
            Ok(())
        })
        .unwrap();
    }
}
