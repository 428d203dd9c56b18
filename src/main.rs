//! Manna daemon
//!
//! Consumes the social feed and distributes token rewards.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! manna --owner <pubkey>
//!
//! # Start with a config file
//! manna --config /path/to/config.toml
//!
//! # Point at a specific feed and relay
//! manna --feed-url http://localhost:8002 --relay-url http://localhost:8545
//!
//! # Process the backlog and run one distribution pass, then exit
//! manna --once
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use manna::{
    events, Config, Distributor, EventBus, HttpFeedClient, HttpTransferExecutor, LedgerDb,
    Processor,
};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "manna")]
#[command(about = "Social-feed reward engine and token distributor")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ledger database path
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Base URL of the chain content API
    #[arg(long, env = "MANNA_FEED_URL")]
    feed_url: Option<String>,

    /// Base URL of the token-transfer relay
    #[arg(long, env = "MANNA_RELAY_URL")]
    relay_url: Option<String>,

    /// Monitored owner public key (repeatable)
    #[arg(long = "owner")]
    owners: Vec<String>,

    /// Campaign start instant, UTC, e.g. 2023-05-13T22:20
    #[arg(long)]
    epoch_start: Option<String>,

    /// Per-sender daily payout cap (0 disables)
    #[arg(long)]
    daily_limit: Option<i64>,

    /// Feed cursor to start from when the database holds none
    #[arg(long)]
    start_cursor: Option<String>,

    /// Drain the feed once, run one distribution pass, and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("manna=info".parse()?))
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(path) = args.db_path {
        config.db_path = path;
    }
    if let Some(url) = args.feed_url {
        config.feed_url = url;
    }
    if let Some(url) = args.relay_url {
        config.relay_url = url;
    }
    if !args.owners.is_empty() {
        config.owners = args.owners;
    }
    if let Some(epoch) = args.epoch_start {
        config.epoch_start = epoch;
    }
    if let Some(limit) = args.daily_limit {
        config.daily_limit = limit;
    }
    if args.start_cursor.is_some() {
        config.start_cursor = args.start_cursor;
    }

    let epoch_secs = config.epoch_secs()?;

    if config.owners.is_empty() {
        anyhow::bail!("No owners configured; set owners in the config file or pass --owner");
    }

    info!(
        db_path = %config.db_path.display(),
        feed_url = %config.feed_url,
        relay_url = %config.relay_url,
        owners = config.owners.len(),
        daily_limit = config.daily_limit,
        epoch_start = %config.epoch_start,
        "Starting manna"
    );

    let db = Arc::new(LedgerDb::open(&config.db_path)?);
    let stats = db.stats()?;
    info!(
        targets = stats.target_count,
        entries = stats.entry_count,
        unsettled = stats.unsettled_count,
        "Ledger opened"
    );

    let event_bus = Arc::new(EventBus::new());
    let audit_handle = events::spawn_logging_listener(Arc::clone(&event_bus));

    let feed = Arc::new(HttpFeedClient::new(config.feed_url.clone(), config.page_size));
    let executor = Arc::new(HttpTransferExecutor::new(config.relay_url.clone()));

    let owners: HashSet<String> = config.owners.iter().cloned().collect();

    let processor = Arc::new(Processor::new(
        Arc::clone(&db),
        feed,
        owners,
        config.rewards.clone(),
        epoch_secs,
        config.start_cursor.clone(),
        Arc::clone(&event_bus),
    ));

    let distributor = Arc::new(Distributor::new(
        Arc::clone(&db),
        executor,
        epoch_secs,
        config.daily_limit,
        Arc::clone(&event_bus),
    ));

    if args.once {
        let processed = processor.drain().await?;
        info!(events = processed, "Feed drained");
        let outcome = distributor.run_pass().await?;
        info!(outcome = ?outcome, "Distribution pass finished");
        return Ok(());
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let processor_handle = {
        let processor = Arc::clone(&processor);
        let shutdown = shutdown_tx.subscribe();
        let poll = Duration::from_secs(config.poll_interval_secs);
        tokio::spawn(async move {
            if let Err(e) = processor.run(poll, shutdown).await {
                error!(error = %e, "Feed processor failed");
            }
        })
    };

    let distributor_handle = {
        let distributor = Arc::clone(&distributor);
        let shutdown = shutdown_tx.subscribe();
        let interval = Duration::from_secs(config.distribution_interval_secs);
        tokio::spawn(async move {
            if let Err(e) = distributor.run(interval, shutdown).await {
                error!(error = %e, "Distributor failed");
            }
        })
    };

    info!("Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down...");

    let _ = shutdown_tx.send(());
    let _ = processor_handle.await;
    let _ = distributor_handle.await;
    audit_handle.abort();

    if let Ok(stats) = db.stats() {
        info!(
            targets = stats.target_count,
            entries = stats.entry_count,
            unsettled = stats.unsettled_count,
            earned = stats.earned_total,
            "Final ledger stats"
        );
    }

    Ok(())
}
