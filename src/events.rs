//! Ledger event bus
//!
//! Every classification and settlement decision is emitted as a typed event
//! so subscribers can reconstruct the ledger's provenance without re-deriving
//! it from raw feed records. Useful for:
//! - Audit logging
//! - Operator dashboards
//! - Test assertions

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Ledger events emitted by the processor and distributor
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    /// An event was classified (whether or not it earned anything)
    EventClassified {
        event_id: String,
        kind: String,
        day: i64,
    },
    /// Content became reward-relevant
    TargetRegistered {
        content_id: Option<String>,
        role: String,
    },
    /// A seeded user target gained its author's identity
    TargetUpgraded {
        content_id: String,
        sender_key: String,
    },
    /// A reward was persisted to the ledger
    EntryRecorded {
        event_id: String,
        sender_key: String,
        reward_kind: String,
        amount: i64,
        day: i64,
    },
    /// An entry was settled with a confirmed transfer id
    EntrySettled {
        entry_id: i64,
        settlement_id: String,
        amount: i64,
    },
    /// An entry was terminally skipped by the daily cap
    EntryCapped {
        entry_id: i64,
        sender_key: String,
        day: i64,
    },
    /// A submitted transfer did not confirm; the entry stays unsettled
    TransferUnconfirmed {
        entry_id: i64,
        transfer_id: String,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &LedgerEvent);
}

/// Broadcast bus for ledger events
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: LedgerEvent) {
        trace!(event = ?event, "Emitting ledger event");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::EntryRecorded {
                event_id,
                sender_key,
                reward_kind,
                amount,
                day,
            } => {
                debug!(
                    event_id = %event_id,
                    sender = %sender_key,
                    kind = %reward_kind,
                    amount,
                    day,
                    "Entry recorded"
                );
            }
            LedgerEvent::EntrySettled {
                entry_id,
                settlement_id,
                amount,
            } => {
                debug!(entry_id, settlement = %settlement_id, amount, "Entry settled");
            }
            LedgerEvent::EntryCapped {
                entry_id,
                sender_key,
                day,
            } => {
                debug!(entry_id, sender = %sender_key, day, "Entry capped");
            }
            LedgerEvent::TransferUnconfirmed {
                entry_id,
                transfer_id,
            } => {
                warn!(entry_id, transfer = %transfer_id, "Transfer not confirmed");
            }
            _ => {
                trace!(event = ?event, "Ledger event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(LedgerEvent::EntryRecorded {
            event_id: "t1".into(),
            sender_key: "alice".into(),
            reward_kind: "COMMENT".into(),
            amount: 100,
            day: 1,
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            LedgerEvent::EntryRecorded {
                event_id, amount, ..
            } => {
                assert_eq!(event_id, "t1");
                assert_eq!(amount, 100);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        // Should not panic even with no subscribers
        bus.emit(LedgerEvent::EntryCapped {
            entry_id: 1,
            sender_key: "alice".into(),
            day: 1,
        });
    }
}
