// src/scheduler.rs
//! Daily push cadence: sleep until the configured wall-clock time, run one
//! batch, repeat until the shutdown flag flips.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::dispatch::Dispatcher;

/// Parse `"HH:MM"` (24h).
pub fn parse_push_at(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("push time {s:?} is not HH:MM"))
}

/// Next instant strictly after `now` whose local time is `at`. Days where
/// `at` falls into a DST gap are skipped.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let mut date = now.date_naive();
    for _ in 0..3 {
        if let Some(candidate) = date.and_time(at).and_local_timezone(tz.clone()).earliest() {
            if candidate > *now {
                return Some(candidate);
            }
        }
        date = date.succ_opt()?;
    }
    None
}

/// Run `push_all` every day at `at` (local time) until shutdown.
pub async fn run_daily(
    dispatcher: &Dispatcher,
    at: NaiveTime,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!(target: "scheduler", at = %at.format("%H:%M"), "daily push scheduled");
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let now = Local::now();
        let next = next_run_after(&now, at).ok_or_else(|| anyhow!("no valid run time after {now}"))?;
        let wait = (next.clone() - now).to_std().unwrap_or_default();
        info!(target: "scheduler", next = %next.to_rfc3339(), wait_secs = wait.as_secs(), "sleeping");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                // sender gone counts as shutdown too
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
                continue;
            }
        }

        match dispatcher.push_all(&shutdown).await {
            Ok(report) => info!(
                target: "scheduler",
                sent = report.sent(),
                failed = report.failed(),
                "daily push done"
            ),
            Err(e) => warn!(target: "scheduler", "daily push failed: {e:#}"),
        }
    }
}
