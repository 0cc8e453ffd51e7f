// src/dispatch/mod.rs
//! # Dispatcher
//! Drives one push cycle per recipient: read preferences and delivery
//! history, allocate, transmit, then append ledger records.
//!
//! Ordering rule: ledger records are written only after the transport
//! accepted the digest. A failed send records nothing, so those items stay
//! eligible next run. A failed ledger write after a successful send is
//! logged and counted but not fatal; the worst outcome is a repeat delivery.

pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::allocator::allocate_with_stats;
use crate::catalog::Catalog;
use crate::feed::{latest_in_category, FeedSource};
use crate::item::{DeliveryRecord, NewsItem};
use crate::logging::anon_id;
use crate::store::{DeliveryLedger, PreferenceStore};

pub use transport::{LogTransport, Transport};

pub const DEFAULT_BUDGET: usize = 10;
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("push_recipients_total", "Recipients processed by push runs.");
        describe_counter!("push_items_sent_total", "News items handed to the transport.");
        describe_counter!(
            "push_transmit_errors_total",
            "Digests the transport failed to deliver."
        );
        describe_counter!(
            "push_ledger_write_failures_total",
            "Ledger records lost after a successful send."
        );
        describe_gauge!("push_batch_last_run_ts", "Unix ts when the last batch finished.");
    });
}

/// Result of one recipient's cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Delivered and fully recorded.
    Sent { count: usize },
    /// Delivered, but `failed` ledger writes were lost.
    SentUnrecorded { count: usize, failed: usize },
    /// No novel item for this recipient.
    NothingToSend,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(String, Outcome)>,
    /// Stopped by the shutdown signal before every recipient was visited.
    pub interrupted: bool,
}

impl BatchReport {
    pub fn sent(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Outcome::Sent { .. } | Outcome::SentUnrecorded { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Outcome::Failed(_)))
            .count()
    }

    pub fn outcome_for(&self, recipient: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(r, _)| r == recipient)
            .map(|(_, o)| o)
    }
}

/// Sleep for `pause`, cut short when shutdown is signalled.
async fn pause_unless_stopped(pause: Duration, shutdown: &watch::Receiver<bool>) {
    let mut rx = shutdown.clone();
    let sender_gone = tokio::select! {
        _ = tokio::time::sleep(pause) => false,
        stopped = rx.wait_for(|stop| *stop) => stopped.is_err(),
    };
    // no stop request can arrive any more; finish the full pause
    if sender_gone {
        tokio::time::sleep(pause).await;
    }
}

pub struct Dispatcher {
    feed: Arc<dyn FeedSource>,
    preferences: Arc<dyn PreferenceStore>,
    ledger: Arc<dyn DeliveryLedger>,
    transport: Arc<dyn Transport>,
    catalog: Catalog,
    budget: usize,
    throttle: Duration,
}

impl Dispatcher {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        preferences: Arc<dyn PreferenceStore>,
        ledger: Arc<dyn DeliveryLedger>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            feed,
            preferences,
            ledger,
            transport,
            catalog: Catalog::default(),
            budget: DEFAULT_BUDGET,
            throttle: DEFAULT_THROTTLE,
        }
    }

    pub fn with_budget(mut self, budget: usize) -> Result<Self> {
        ensure!(budget >= 1, "push budget must be at least 1");
        self.budget = budget;
        Ok(self)
    }

    /// Minimum pause between two recipients in a batch.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Categories accepted by [`Dispatcher::search_category`].
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Latest `count` items of one category. The query goes through the
    /// catalog first, so a typo fails with a suggestion instead of an empty
    /// result. A lookup only: no novelty filter, nothing recorded.
    pub async fn search_category(&self, query: &str, count: usize) -> Result<Vec<NewsItem>> {
        let category = self.catalog.resolve(query)?.to_string();
        let candidates = self
            .feed
            .fetch_latest()
            .await
            .with_context(|| format!("fetching feed {}", self.feed.name()))?;
        let found = latest_in_category(&candidates, &category, count);
        debug!(target: "push", category = %category, found = found.len(), "category search");
        Ok(found)
    }

    /// Fetch the feed and push to a single recipient.
    pub async fn push_to(&self, recipient: &str) -> Result<Outcome> {
        ensure_metrics_described();
        let candidates = self
            .feed
            .fetch_latest()
            .await
            .with_context(|| format!("fetching feed {}", self.feed.name()))?;
        Ok(self.deliver_to(recipient, &candidates).await)
    }

    /// Push to every recipient on record. The feed is fetched once and
    /// shared; a failing recipient never stops the rest. The shutdown flag is
    /// checked between recipients, so an in-flight cycle always completes.
    pub async fn push_all(&self, shutdown: &watch::Receiver<bool>) -> Result<BatchReport> {
        ensure_metrics_described();

        let candidates = self
            .feed
            .fetch_latest()
            .await
            .with_context(|| format!("fetching feed {}", self.feed.name()))?;
        let recipients = self
            .preferences
            .recipients()
            .await
            .context("listing recipients")?;

        info!(
            target: "push",
            recipients = recipients.len(),
            candidates = candidates.len(),
            budget = self.budget,
            "batch started"
        );

        let mut report = BatchReport::default();
        for (i, recipient) in recipients.iter().enumerate() {
            if i > 0 && !self.throttle.is_zero() {
                pause_unless_stopped(self.throttle, shutdown).await;
            }
            if *shutdown.borrow() {
                info!(
                    target: "push",
                    done = i,
                    left = recipients.len() - i,
                    "batch interrupted"
                );
                report.interrupted = true;
                break;
            }
            let outcome = self.deliver_to(recipient, &candidates).await;
            report.outcomes.push((recipient.clone(), outcome));
        }

        gauge!("push_batch_last_run_ts").set(Utc::now().timestamp() as f64);
        info!(
            target: "push",
            sent = report.sent(),
            failed = report.failed(),
            interrupted = report.interrupted,
            "batch finished"
        );
        Ok(report)
    }

    /// One recipient's allocate → transmit → record cycle. Never panics and
    /// never propagates: every failure is folded into the outcome.
    pub async fn deliver_to(&self, recipient: &str, candidates: &[NewsItem]) -> Outcome {
        counter!("push_recipients_total").increment(1);
        let who = anon_id(recipient);

        let preferred = match self.preferences.get(recipient).await {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "push", recipient = %who, "preferences unavailable: {e:#}");
                return Outcome::Failed(format!("preferences: {e:#}"));
            }
        };
        let delivered = match self.ledger.was_delivered(recipient).await {
            Ok(d) => d,
            Err(e) => {
                warn!(target: "push", recipient = %who, "ledger unavailable: {e:#}");
                return Outcome::Failed(format!("ledger: {e:#}"));
            }
        };

        let allocation = match allocate_with_stats(candidates, &preferred, &delivered, self.budget) {
            Ok(a) => a,
            Err(e) => return Outcome::Failed(e.to_string()),
        };
        debug!(
            target: "push",
            recipient = %who,
            categories = preferred.len(),
            base = allocation.stats.base,
            remainder = allocation.stats.remainder,
            fallback = allocation.stats.fallback,
            excluded = allocation.stats.excluded,
            "allocated"
        );

        let items = allocation.items;
        if items.is_empty() {
            info!(target: "push", recipient = %who, "nothing new to push");
            return Outcome::NothingToSend;
        }

        if let Err(e) = self.transport.send(recipient, &items).await {
            counter!("push_transmit_errors_total").increment(1);
            warn!(
                target: "push",
                recipient = %who,
                transport = self.transport.name(),
                "send failed, nothing recorded: {e:#}"
            );
            return Outcome::Failed(format!("transport: {e:#}"));
        }
        counter!("push_items_sent_total").increment(items.len() as u64);

        let at = Utc::now();
        let mut failed = 0usize;
        for item in &items {
            let record = DeliveryRecord::for_item(recipient, item, at);
            if let Err(e) = self.ledger.record_delivery(record).await {
                failed += 1;
                counter!("push_ledger_write_failures_total").increment(1);
                warn!(
                    target: "push",
                    recipient = %who,
                    item = %item.id,
                    "sent but not recorded, may repeat next run: {e:#}"
                );
            }
        }

        info!(target: "push", recipient = %who, count = items.len(), "pushed");
        if failed > 0 {
            Outcome::SentUnrecorded {
                count: items.len(),
                failed,
            }
        } else {
            Outcome::Sent { count: items.len() }
        }
    }
}
