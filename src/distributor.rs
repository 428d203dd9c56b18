//! Distribution scheduler
//!
//! Turns unsettled ledger entries into idempotent payout attempts, oldest
//! program day first so cap and bonus semantics settle in causal order even
//! when passes run with gaps. A pass serializes against itself via a
//! try-lock; settlement is a compare-and-set on `settlement_id`, so a lost
//! race or a crash-and-restart never double-submits the same entry. The
//! ledger lock is released before every await.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::day;
use crate::db::{entries, LedgerDb, DAILY_LIMIT_SENTINEL};
use crate::error::MannaError;
use crate::events::{EventBus, LedgerEvent};
use crate::transfer::TransferExecutor;

/// Outcome of one distribution pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The program has not started yet (today < 1). Reported, not an error.
    NotStarted { today: i64 },
    /// Another pass is already in flight
    AlreadyRunning,
    Completed(PassReport),
}

/// What a completed pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub days: i64,
    pub settled: u64,
    pub capped: u64,
    /// Entries left unsettled for the next pass (submission failed or the
    /// transfer did not confirm)
    pub deferred: u64,
}

/// Distribution scheduler
pub struct Distributor {
    db: Arc<LedgerDb>,
    executor: Arc<dyn TransferExecutor>,
    epoch_secs: i64,
    /// Per-sender daily payout cap; 0 disables the cap
    daily_limit: i64,
    events: Arc<EventBus>,
    pass_lock: Mutex<()>,
}

impl Distributor {
    pub fn new(
        db: Arc<LedgerDb>,
        executor: Arc<dyn TransferExecutor>,
        epoch_secs: i64,
        daily_limit: i64,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            db,
            executor,
            epoch_secs,
            daily_limit,
            events,
            pass_lock: Mutex::new(()),
        }
    }

    /// Run one distribution pass over days 1..=today.
    pub async fn run_pass(&self) -> Result<PassOutcome, MannaError> {
        let _guard = match self.pass_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(PassOutcome::AlreadyRunning),
        };

        let today = day::today(self.epoch_secs);
        if today < 1 {
            info!(today, "Distribution not started yet");
            return Ok(PassOutcome::NotStarted { today });
        }

        let mut report = PassReport {
            days: today,
            ..Default::default()
        };

        for day in 1..=today {
            let done_sum = self
                .db
                .with_conn(|conn| entries::distributed_day_sum(conn, day))?;
            debug!(day, distributed = done_sum, "Distribution day");

            let todo = self
                .db
                .with_conn(|conn| entries::unsettled_for_day(conn, day))?;

            for entry in todo {
                self.settle_entry(&entry, day, &mut report).await?;
            }
        }

        info!(
            days = report.days,
            settled = report.settled,
            capped = report.capped,
            deferred = report.deferred,
            "Distribution pass complete"
        );

        Ok(PassOutcome::Completed(report))
    }

    async fn settle_entry(
        &self,
        entry: &entries::EntryRow,
        day: i64,
        report: &mut PassReport,
    ) -> Result<(), MannaError> {
        let already = self
            .db
            .with_conn(|conn| entries::confirmed_day_sum(conn, &entry.sender_key, day))?;

        if self.daily_limit > 0 && already + entry.amount > self.daily_limit {
            debug!(
                entry_id = entry.id,
                sender = %entry.sender_key,
                already,
                amount = entry.amount,
                "Daily limit reached, skipping entry"
            );
            self.db
                .with_conn(|conn| entries::settle(conn, entry.id, DAILY_LIMIT_SENTINEL))?;
            self.events.emit(LedgerEvent::EntryCapped {
                entry_id: entry.id,
                sender_key: entry.sender_key.clone(),
                day,
            });
            report.capped += 1;
            return Ok(());
        }

        let transfer_id = match self.executor.transfer(&entry.address, entry.amount).await {
            Ok(id) => id,
            Err(e) => {
                // Not fatal for the pass; the entry stays unsettled and is
                // retried on the next run.
                warn!(
                    entry_id = entry.id,
                    address = %entry.address,
                    amount = entry.amount,
                    error = %e,
                    "Transfer submission failed"
                );
                report.deferred += 1;
                return Ok(());
            }
        };

        let confirmed = match self.executor.is_confirmed(&transfer_id).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                warn!(entry_id = entry.id, transfer = %transfer_id, error = %e, "Confirmation check failed");
                false
            }
        };

        if confirmed {
            let applied = self
                .db
                .with_conn(|conn| entries::settle(conn, entry.id, &transfer_id))?;
            if applied {
                info!(
                    entry_id = entry.id,
                    transfer = %transfer_id,
                    address = %entry.address,
                    amount = entry.amount,
                    "Entry settled"
                );
                self.events.emit(LedgerEvent::EntrySettled {
                    entry_id: entry.id,
                    settlement_id: transfer_id,
                    amount: entry.amount,
                });
                report.settled += 1;
            } else {
                warn!(entry_id = entry.id, "Entry was settled concurrently");
            }
        } else {
            warn!(
                entry_id = entry.id,
                transfer = %transfer_id,
                address = %entry.address,
                amount = entry.amount,
                "Transfer not confirmed, will retry"
            );
            self.events.emit(LedgerEvent::TransferUnconfirmed {
                entry_id: entry.id,
                transfer_id,
            });
            report.deferred += 1;
        }

        Ok(())
    }

    /// Run periodic passes until shutdown
    pub async fn run(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), MannaError> {
        info!("Distributor started");

        loop {
            match self.run_pass().await {
                Ok(PassOutcome::AlreadyRunning) => {
                    warn!("Skipping distribution pass, previous pass still running")
                }
                Ok(_) => {}
                Err(MannaError::Database(e)) => return Err(MannaError::Database(e)),
                Err(e) => warn!(error = %e, "Distribution pass failed, will retry"),
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Distributor stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}
