//! news-push runner
//! Loads config, opens the JSON-backed stores, and runs the daily push
//! (or a single batch with `PUSH_RUN_ONCE=1`, or a one-off category lookup
//! with `PUSH_SEARCH=<category>`). Ctrl-C stops the run between recipients.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use news_push::dispatch::{Dispatcher, LogTransport};
use news_push::feed::JsonFeed;
use news_push::scheduler::{parse_push_at, run_daily};
use news_push::store::{JsonLedger, JsonPreferenceStore};
use news_push::{logging, PushConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    logging::init_tracing();

    let cfg = PushConfig::load_default().context("loading push config")?;
    let at = parse_push_at(&cfg.push_at)?;
    info!(
        budget = cfg.budget,
        push_at = %cfg.push_at,
        throttle_ms = cfg.throttle_ms,
        categories = cfg.categories.len(),
        "config loaded"
    );

    let preferences = JsonPreferenceStore::open(&cfg.preferences_path).await?;
    let dispatcher = Dispatcher::new(
        Arc::new(JsonFeed::from_path(&cfg.feed_path)),
        Arc::new(preferences),
        Arc::new(JsonLedger::new(&cfg.ledger_path)),
        Arc::new(LogTransport::new()),
    )
    .with_budget(cfg.budget)?
    .with_throttle(cfg.throttle())
    .with_catalog(cfg.catalog());

    if let Some(query) = std::env::var("PUSH_SEARCH").ok().filter(|q| !q.trim().is_empty()) {
        let found = dispatcher.search_category(&query, cfg.budget).await?;
        info!(query = %query, found = found.len(), "category search");
        for (i, item) in found.iter().enumerate() {
            info!(rank = i + 1, id = %item.id, link = %item.link, "{}", item.title);
        }
        return Ok(());
    }

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested, finishing current recipient");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!("cannot listen for ctrl-c: {e}");
                // keep the sender alive; dropping it reads as shutdown
                std::future::pending::<()>().await;
                drop(tx);
            }
        }
    });

    let run_once = std::env::var("PUSH_RUN_ONCE").ok().is_some_and(|v| v == "1");
    if run_once {
        let report = dispatcher.push_all(&rx).await?;
        info!(
            sent = report.sent(),
            failed = report.failed(),
            interrupted = report.interrupted,
            "single run done"
        );
        return Ok(());
    }

    run_daily(&dispatcher, at, rx).await
}
