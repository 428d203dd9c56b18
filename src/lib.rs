//! Manna - social-feed reward engine and token distributor
//!
//! Watches an append-only feed of social-graph events produced around a set
//! of monitored accounts ("owners"), decides which events earn a reward
//! under a point-based incentive scheme, and distributes rewards as on-chain
//! token transfers under a per-account daily cap.
//!
//! ## Architecture
//!
//! ```text
//! feed client ──> processor ──> classifier ──┬─> targets  (ledger db)
//!                                            └─> eligibility resolver ──> entries
//!
//! distributor ──> unsettled entries ──> transfer executor ──> settlement
//! ```
//!
//! The processor drains the feed strictly in order; the distributor runs
//! independently over the entry table, oldest program day first. Both paths
//! are idempotent under replay: targets and entries are keyed by event id,
//! and settlement is a compare-and-set.

pub mod config;
pub mod error;
pub mod day;
pub mod feed;
pub mod classifier;
pub mod rewards;
pub mod transfer;
pub mod events;
pub mod processor;
pub mod distributor;
pub mod db;

// Re-exports
pub use config::Config;
pub use error::MannaError;
pub use classifier::{classify, Classification, Role, RewardTrigger, TargetLookup, TargetReg};
pub use db::{LedgerDb, DAILY_LIMIT_SENTINEL};
pub use distributor::{Distributor, PassOutcome, PassReport};
pub use events::{EventBus, LedgerEvent};
pub use feed::{Event, EventContent, EventKind, FeedClient, HttpFeedClient};
pub use processor::Processor;
pub use rewards::{RewardKind, RewardTable};
pub use transfer::{sender_key_to_address, HttpTransferExecutor, TransferExecutor};
