//! Reward kinds, the point table, and the eligibility & bonus resolver
//!
//! A reward trigger produces up to three ledger entries: a one-time
//! `FIRST_EVER` bonus, a per-day `FIRST_DAILY` bonus, then the base kind.
//! Both bonus checks run against persisted entries only, so a suppressed
//! zero-amount base reward never counts as "already rewarded today".

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::entries::{self, NewEntry};
use crate::error::MannaError;

/// Reward kinds, in the ledger's string form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardKind {
    FirstEver,
    FirstDaily,
    Like,
    Comment,
    Liked,
    OwnerPost,
    OwnerComment,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::FirstEver => "FIRST_EVER",
            RewardKind::FirstDaily => "FIRST_DAILY",
            RewardKind::Like => "LIKE",
            RewardKind::Comment => "COMMENT",
            RewardKind::Liked => "LIKED",
            RewardKind::OwnerPost => "OWNER_POST",
            RewardKind::OwnerComment => "OWNER_COMMENT",
        }
    }
}

impl std::fmt::Display for RewardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point amounts per reward kind. Injected configuration, not a module
/// constant; a kind set to 0 is suppressed from the ledger entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardTable {
    #[serde(default = "default_first_ever")]
    pub first_ever: i64,
    #[serde(default = "default_first_daily")]
    pub first_daily: i64,
    #[serde(default = "default_like")]
    pub like: i64,
    #[serde(default = "default_comment")]
    pub comment: i64,
    #[serde(default = "default_liked")]
    pub liked: i64,
    #[serde(default = "default_owner_post")]
    pub owner_post: i64,
    #[serde(default = "default_owner_comment")]
    pub owner_comment: i64,
}

fn default_first_ever() -> i64 {
    300
}
fn default_first_daily() -> i64 {
    30
}
fn default_like() -> i64 {
    20
}
fn default_comment() -> i64 {
    100
}
// Older deployments paid 0 for LIKED; the current schema pays 50.
fn default_liked() -> i64 {
    50
}
fn default_owner_post() -> i64 {
    300
}
fn default_owner_comment() -> i64 {
    50
}

impl Default for RewardTable {
    fn default() -> Self {
        Self {
            first_ever: default_first_ever(),
            first_daily: default_first_daily(),
            like: default_like(),
            comment: default_comment(),
            liked: default_liked(),
            owner_post: default_owner_post(),
            owner_comment: default_owner_comment(),
        }
    }
}

impl RewardTable {
    pub fn amount(&self, kind: RewardKind) -> i64 {
        match kind {
            RewardKind::FirstEver => self.first_ever,
            RewardKind::FirstDaily => self.first_daily,
            RewardKind::Like => self.like,
            RewardKind::Comment => self.comment,
            RewardKind::Liked => self.liked,
            RewardKind::OwnerPost => self.owner_post,
            RewardKind::OwnerComment => self.owner_comment,
        }
    }
}

/// One reward resolved for a trigger, with its persistence outcome
#[derive(Debug, Clone)]
pub struct ResolvedReward {
    pub kind: RewardKind,
    pub amount: i64,
    pub persisted: bool,
}

/// Resolve a reward trigger into ledger entries, inside the event's
/// transaction.
///
/// The bonus checks are independent, not else-if: a sender's first ever
/// qualifying event earns `FIRST_EVER`, `FIRST_DAILY` and the base reward.
/// The first-daily count excludes `FIRST_EVER` so the bonus inserted a
/// moment earlier does not mask it.
#[allow(clippy::too_many_arguments)]
pub fn resolve_rewards(
    conn: &Connection,
    table: &RewardTable,
    event_id: &str,
    sender_key: &str,
    address: &str,
    day: i64,
    target_content_id: Option<&str>,
    base: RewardKind,
) -> Result<Vec<ResolvedReward>, MannaError> {
    let mut resolved = Vec::with_capacity(3);

    let record = |conn: &Connection, kind: RewardKind, memo: Option<String>| {
        let amount = table.amount(kind);
        let persisted = entries::insert_entry(
            conn,
            &NewEntry {
                event_id: event_id.to_string(),
                sender_key: sender_key.to_string(),
                address: address.to_string(),
                program_day: day,
                target_content_id: target_content_id.map(String::from),
                reward_kind: kind.as_str().to_string(),
                amount,
                memo,
            },
        )?;
        Ok::<ResolvedReward, MannaError>(ResolvedReward {
            kind,
            amount,
            persisted,
        })
    };

    if entries::count_for_sender(conn, sender_key)? == 0 {
        resolved.push(record(
            conn,
            RewardKind::FirstEver,
            Some(format!("with {}", base)),
        )?);
    }

    if entries::count_for_sender_day(conn, sender_key, day, RewardKind::FirstEver.as_str())? == 0 {
        resolved.push(record(
            conn,
            RewardKind::FirstDaily,
            Some(format!("with {}", base)),
        )?);
    }

    resolved.push(record(conn, base, None)?);

    debug!(
        event_id = %event_id,
        sender = %sender_key,
        day,
        base = %base,
        entries = resolved.len(),
        "Resolved reward trigger"
    );

    Ok(resolved)
}
