//! Feed-consumption engine
//!
//! One logical worker drains the feed strictly sequentially: event n+1 is
//! never classified before event n's writes commit, because the classifier's
//! lookups depend on prior registrations being visible. Each event is
//! applied in a single transaction (target mutation + ledger entries +
//! cursor advance), so a crash re-processes the last event at worst, and
//! every insert is idempotent under at-least-once replay.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::classifier::{self, Classification, Role, TargetLookup};
use crate::day;
use crate::db::{cursor, targets, LedgerDb};
use crate::error::MannaError;
use crate::events::{EventBus, LedgerEvent};
use crate::feed::{Event, FeedClient};
use crate::rewards::{self, RewardTable};
use crate::transfer::sender_key_to_address;

/// Target lookups against the live transaction
struct TxTargets<'a>(&'a Connection);

impl TargetLookup for TxTargets<'_> {
    fn is_target(&self, content_id: &str, role: Role) -> Result<bool, MannaError> {
        targets::is_target(self.0, content_id, role)
    }
}

/// Sequential feed consumer
pub struct Processor {
    db: Arc<LedgerDb>,
    feed: Arc<dyn FeedClient>,
    owners: HashSet<String>,
    rewards: RewardTable,
    epoch_secs: i64,
    /// Used when the database holds no cursor yet
    start_cursor: Option<String>,
    events: Arc<EventBus>,
}

impl Processor {
    pub fn new(
        db: Arc<LedgerDb>,
        feed: Arc<dyn FeedClient>,
        owners: HashSet<String>,
        rewards: RewardTable,
        epoch_secs: i64,
        start_cursor: Option<String>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            db,
            feed,
            owners,
            rewards,
            epoch_secs,
            start_cursor,
            events,
        }
    }

    /// Pull feed pages until the feed reports caught-up, applying each event
    /// in order. Returns the number of events processed.
    pub async fn drain(&self) -> Result<u64, MannaError> {
        let mut processed = 0u64;

        loop {
            let cursor = self
                .db
                .with_conn(|conn| cursor::get_cursor(conn))?
                .or_else(|| self.start_cursor.clone());

            let events = self.feed.fetch_since(cursor.as_deref()).await?;
            if events.is_empty() {
                break;
            }

            debug!(count = events.len(), cursor = ?cursor, "Processing feed page");

            for event in &events {
                self.apply_event(event)?;
                processed += 1;
            }
        }

        Ok(processed)
    }

    /// Apply one event: classify, mutate targets, resolve rewards, advance
    /// the cursor. A single transaction; all inserts tolerate replay.
    fn apply_event(&self, event: &Event) -> Result<(), MannaError> {
        let event_day = day::program_day(self.epoch_secs, event.timestamp);

        self.events.emit(LedgerEvent::EventClassified {
            event_id: event.id.clone(),
            kind: event.kind.as_str().to_string(),
            day: event_day,
        });

        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let classification = classifier::classify(event, &self.owners, &TxTargets(&tx))?;
            debug!(
                event_id = %event.id,
                kind = event.kind.as_str(),
                day = event_day,
                result = ?classification_tag(&classification),
                "Classified event"
            );

            match classification {
                Classification::NoMatch => {}
                Classification::Registered(reg) => {
                    if targets::insert_target(&tx, &reg)? {
                        self.events.emit(LedgerEvent::TargetRegistered {
                            content_id: reg.content_id.clone(),
                            role: reg.role.as_str().to_string(),
                        });
                    }
                }
                Classification::Reward(trigger) => {
                    if let Some(ref reg) = trigger.registration {
                        if targets::insert_target(&tx, reg)? {
                            self.events.emit(LedgerEvent::TargetRegistered {
                                content_id: reg.content_id.clone(),
                                role: reg.role.as_str().to_string(),
                            });
                        }
                    }

                    if let Some(ref upgrade) = trigger.upgrade {
                        if targets::upgrade_user_target(
                            &tx,
                            &upgrade.content_id,
                            &upgrade.event_id,
                            &upgrade.sender_key,
                        )? {
                            self.events.emit(LedgerEvent::TargetUpgraded {
                                content_id: upgrade.content_id.clone(),
                                sender_key: upgrade.sender_key.clone(),
                            });
                        }
                    }

                    let address = sender_key_to_address(&event.sender_key);
                    let resolved = rewards::resolve_rewards(
                        &tx,
                        &self.rewards,
                        &event.id,
                        &event.sender_key,
                        &address,
                        event_day,
                        trigger.target_content_id.as_deref(),
                        trigger.kind,
                    )?;

                    for reward in resolved.iter().filter(|r| r.persisted) {
                        self.events.emit(LedgerEvent::EntryRecorded {
                            event_id: event.id.clone(),
                            sender_key: event.sender_key.clone(),
                            reward_kind: reward.kind.as_str().to_string(),
                            amount: reward.amount,
                            day: event_day,
                        });
                    }
                }
            }

            cursor::set_cursor(&tx, &event.id)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Run the consumption loop until shutdown. Feed failures are logged
    /// and retried after the poll interval; database errors propagate.
    pub async fn run(
        &self,
        poll_interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), MannaError> {
        info!("Feed processor started");

        loop {
            match self.drain().await {
                Ok(0) => {}
                Ok(n) => info!(events = n, "Processed feed events"),
                Err(MannaError::Database(e)) => return Err(MannaError::Database(e)),
                Err(e) => warn!(error = %e, "Feed drain failed, will retry"),
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Feed processor stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

fn classification_tag(c: &Classification) -> &'static str {
    match c {
        Classification::NoMatch => "no_match",
        Classification::Registered(_) => "registered",
        Classification::Reward(_) => "reward",
    }
}
