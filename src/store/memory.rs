// src/store/memory.rs
use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{DeliveryLedger, PreferenceStore};
use crate::item::{DeliveryRecord, RecipientPreference};

/// Process-local preference store. The map lock is held only for the
/// duration of one read or one conditional write, never across an await.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    inner: Mutex<BTreeMap<String, RecipientPreference>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full record including `last_updated`.
    pub fn record(&self, recipient: &str) -> Option<RecipientPreference> {
        self.inner.lock().get(recipient).cloned()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, recipient: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .get(recipient)
            .map(|p| p.categories.clone())
            .unwrap_or_default())
    }

    async fn set(&self, recipient: &str, categories: Vec<String>) -> Result<()> {
        let pref = RecipientPreference::new(recipient, categories, Utc::now());
        self.inner.lock().insert(recipient.to_string(), pref);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        recipient: &str,
        expected: &[String],
        new: Vec<String>,
    ) -> Result<bool> {
        let mut map = self.inner.lock();
        let current: &[String] = map
            .get(recipient)
            .map(|p| p.categories.as_slice())
            .unwrap_or(&[]);
        if current != expected {
            return Ok(false);
        }
        map.insert(
            recipient.to_string(),
            RecipientPreference::new(recipient, new, Utc::now()),
        );
        Ok(true)
    }

    async fn recipients(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().keys().cloned().collect())
    }
}

/// Process-local append-only ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: Mutex<HashMap<String, Vec<DeliveryRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of one recipient in append order.
    pub fn history(&self, recipient: &str) -> Vec<DeliveryRecord> {
        self.inner
            .lock()
            .get(recipient)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DeliveryLedger for MemoryLedger {
    async fn record_delivery(&self, record: DeliveryRecord) -> Result<()> {
        self.inner
            .lock()
            .entry(record.recipient_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn was_delivered(&self, recipient: &str) -> Result<HashSet<String>> {
        Ok(self
            .inner
            .lock()
            .get(recipient)
            .map(|v| v.iter().map(|r| r.item_id.clone()).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::item::NewsItem;

    #[tokio::test]
    async fn set_dedupes_and_stamps() {
        let s = MemoryPreferenceStore::new();
        s.set("U1", vec!["政治".into(), "政治".into(), "國際".into()])
            .await
            .unwrap();
        assert_eq!(s.get("U1").await.unwrap(), vec!["政治", "國際"]);
        assert!(s.record("U1").is_some());
        assert!(s.get("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_compare_and_set_is_rejected() {
        let s = MemoryPreferenceStore::new();
        assert!(s
            .compare_and_set("U1", &[], vec!["政治".into()])
            .await
            .unwrap());
        // caller still believes the set is empty
        assert!(!s
            .compare_and_set("U1", &[], vec!["社會".into()])
            .await
            .unwrap());
        assert_eq!(s.get("U1").await.unwrap(), vec!["政治"]);
    }

    #[tokio::test]
    async fn toggle_select_all_and_clear() {
        let s = MemoryPreferenceStore::new();
        assert!(s.toggle("U1", "政治").await.unwrap());
        assert!(s.toggle("U1", "社會").await.unwrap());
        assert!(!s.toggle("U1", "政治").await.unwrap());
        assert_eq!(s.get("U1").await.unwrap(), vec!["社會"]);

        let catalog = Catalog::default();
        s.select_all("U1", &catalog).await.unwrap();
        assert_eq!(s.get("U1").await.unwrap(), catalog.categories().to_vec());

        s.clear("U1").await.unwrap();
        assert!(s.get("U1").await.unwrap().is_empty());
        assert_eq!(s.recipients().await.unwrap(), vec!["U1".to_string()]);
    }

    #[tokio::test]
    async fn ledger_collects_ids_per_recipient() {
        let l = MemoryLedger::new();
        let now = Utc::now();
        let a = NewsItem::new("a", "政治", "A");
        let b = NewsItem::new("b", "社會", "B");
        l.record_delivery(DeliveryRecord::for_item("U1", &a, now))
            .await
            .unwrap();
        l.record_delivery(DeliveryRecord::for_item("U1", &b, now))
            .await
            .unwrap();
        l.record_delivery(DeliveryRecord::for_item("U2", &a, now))
            .await
            .unwrap();

        let u1 = l.was_delivered("U1").await.unwrap();
        assert!(u1.contains("a") && u1.contains("b"));
        assert_eq!(l.was_delivered("U2").await.unwrap().len(), 1);
        assert!(l.was_delivered("U3").await.unwrap().is_empty());
        assert_eq!(l.history("U1")[1].category, "社會");
    }
}
