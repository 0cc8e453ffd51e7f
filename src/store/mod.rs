// src/store/mod.rs
//! Key-value contracts for recipient preferences and the delivery ledger,
//! plus in-memory and JSON-file implementations.

pub mod json;
pub mod memory;

use std::collections::HashSet;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::item::DeliveryRecord;
use crate::logging::anon_id;

pub use json::{JsonLedger, JsonPreferenceStore};
pub use memory::{MemoryLedger, MemoryPreferenceStore};

/// Upper bound on compare-and-set retries for a single toggle. Every failed
/// attempt means a concurrent writer succeeded, so this is only reached
/// under pathological contention.
const MAX_TOGGLE_ATTEMPTS: usize = 128;

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Ordered categories of `recipient`; empty when unknown.
    async fn get(&self, recipient: &str) -> Result<Vec<String>>;

    /// Replace the category set. Repeats and blanks are dropped, order kept.
    async fn set(&self, recipient: &str, categories: Vec<String>) -> Result<()>;

    /// Store `new` only if the current set still equals `expected`
    /// (an unknown recipient counts as the empty set). Returns whether the
    /// write happened.
    async fn compare_and_set(
        &self,
        recipient: &str,
        expected: &[String],
        new: Vec<String>,
    ) -> Result<bool>;

    /// Every recipient with a stored record, sorted by id.
    async fn recipients(&self) -> Result<Vec<String>>;

    /// Add `category` if absent, remove it if present. Returns the resulting
    /// membership. Concurrent toggles on the same recipient never lose an
    /// update: each one is a read followed by a conditional write, retried
    /// when another writer got in first.
    async fn toggle(&self, recipient: &str, category: &str) -> Result<bool> {
        for attempt in 1..=MAX_TOGGLE_ATTEMPTS {
            let current = self.get(recipient).await?;
            let (next, member) = toggled(&current, category);
            if self.compare_and_set(recipient, &current, next).await? {
                return Ok(member);
            }
            tracing::debug!(
                target: "store",
                recipient = %anon_id(recipient),
                attempt,
                "toggle lost a race, retrying"
            );
        }
        bail!("toggle for {} gave up after {MAX_TOGGLE_ATTEMPTS} attempts", anon_id(recipient))
    }

    /// Subscribe to every catalog category, in catalog order.
    async fn select_all(&self, recipient: &str, catalog: &Catalog) -> Result<()> {
        self.set(recipient, catalog.categories().to_vec()).await
    }

    /// Drop all preferences but keep the recipient on record.
    async fn clear(&self, recipient: &str) -> Result<()> {
        self.set(recipient, Vec::new()).await
    }
}

#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    async fn record_delivery(&self, record: DeliveryRecord) -> Result<()>;

    /// All item ids ever delivered to `recipient`.
    async fn was_delivered(&self, recipient: &str) -> Result<HashSet<String>>;
}

/// Toggle `category` in `current`; new categories go last (lowest priority).
pub fn toggled(current: &[String], category: &str) -> (Vec<String>, bool) {
    if current.iter().any(|c| c == category) {
        let next = current.iter().filter(|c| *c != category).cloned().collect();
        (next, false)
    } else {
        let mut next = current.to_vec();
        next.push(category.to_string());
        (next, true)
    }
}
