// src/store/json.rs
//! File-backed stores. Preferences live in one pretty-printed JSON document
//! rewritten on every mutation (temp file + rename); the ledger is an
//! append-only JSON-lines file.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{DeliveryLedger, PreferenceStore};
use crate::item::{DeliveryRecord, RecipientPreference};

pub struct JsonPreferenceStore {
    path: PathBuf,
    // async lock: held across the file write so the file and map never diverge
    inner: Mutex<BTreeMap<String, RecipientPreference>>,
}

impl JsonPreferenceStore {
    /// Open (or lazily create) the store at `path`. A missing file is an
    /// empty store; a corrupt file is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = match fs::read_to_string(&path).await {
            Ok(s) if s.trim().is_empty() => BTreeMap::new(),
            Ok(s) => {
                let list: Vec<RecipientPreference> = serde_json::from_str(&s)
                    .with_context(|| format!("parsing preferences from {}", path.display()))?;
                list.into_iter()
                    .map(|p| (p.recipient_id.clone(), p))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading preferences from {}", path.display()))
            }
        };
        debug!(target: "store", path = %path.display(), recipients = map.len(), "preferences loaded");
        Ok(Self {
            path,
            inner: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `next` and only then make it the live state.
    async fn commit(
        &self,
        live: &mut BTreeMap<String, RecipientPreference>,
        next: BTreeMap<String, RecipientPreference>,
    ) -> Result<()> {
        let list: Vec<&RecipientPreference> = next.values().collect();
        let body = serde_json::to_vec_pretty(&list).context("serializing preferences")?;
        write_atomic(&self.path, &body).await?;
        *live = next;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for JsonPreferenceStore {
    async fn get(&self, recipient: &str) -> Result<Vec<String>> {
        let map = self.inner.lock().await;
        Ok(map
            .get(recipient)
            .map(|p| p.categories.clone())
            .unwrap_or_default())
    }

    async fn set(&self, recipient: &str, categories: Vec<String>) -> Result<()> {
        let mut map = self.inner.lock().await;
        let mut next = map.clone();
        next.insert(
            recipient.to_string(),
            RecipientPreference::new(recipient, categories, Utc::now()),
        );
        self.commit(&mut map, next).await
    }

    async fn compare_and_set(
        &self,
        recipient: &str,
        expected: &[String],
        new: Vec<String>,
    ) -> Result<bool> {
        let mut map = self.inner.lock().await;
        let matches = match map.get(recipient) {
            Some(p) => p.categories.as_slice() == expected,
            None => expected.is_empty(),
        };
        if !matches {
            return Ok(false);
        }
        let mut next = map.clone();
        next.insert(
            recipient.to_string(),
            RecipientPreference::new(recipient, new, Utc::now()),
        );
        self.commit(&mut map, next).await?;
        Ok(true)
    }

    async fn recipients(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().await.keys().cloned().collect())
    }
}

async fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Append-only JSON-lines ledger. The file is read once, on first use, into
/// a per-recipient index that appends keep current; the process is assumed
/// to be the only writer.
pub struct JsonLedger {
    path: PathBuf,
    index: Mutex<Option<LedgerIndex>>,
}

#[derive(Debug, Default)]
struct LedgerIndex {
    delivered: HashMap<String, HashSet<String>>,
    // last line on disk has no terminator (crash or failed write mid-append)
    torn_tail: bool,
}

impl LedgerIndex {
    fn insert(&mut self, record: DeliveryRecord) {
        self.delivered
            .entry(record.recipient_id)
            .or_default()
            .insert(record.item_id);
    }
}

impl JsonLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            index: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_index(&self) -> Result<LedgerIndex> {
        let bytes = match fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LedgerIndex::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading ledger {}", self.path.display()))
            }
        };

        // a torn write may split a multi-byte character
        let content = String::from_utf8_lossy(&bytes);
        let mut index = LedgerIndex {
            torn_tail: !bytes.is_empty() && !bytes.ends_with(b"\n"),
            ..LedgerIndex::default()
        };
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DeliveryRecord>(line) {
                Ok(r) => index.insert(r),
                // a torn line only risks a duplicate delivery
                Err(e) => warn!(target: "store", line = n + 1, "skipping bad ledger line: {e}"),
            }
        }
        debug!(
            target: "store",
            path = %self.path.display(),
            recipients = index.delivered.len(),
            torn_tail = index.torn_tail,
            "ledger loaded"
        );
        Ok(index)
    }

    async fn append(&self, bytes: &[u8]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening ledger {}", self.path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("appending to ledger {}", self.path.display()))?;
        file.flush().await.context("flushing ledger")?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryLedger for JsonLedger {
    async fn record_delivery(&self, record: DeliveryRecord) -> Result<()> {
        let body = serde_json::to_vec(&record).context("serializing delivery record")?;

        let mut slot = self.index.lock().await;
        if slot.is_none() {
            *slot = Some(self.load_index().await?);
        }
        let index = slot.get_or_insert_with(LedgerIndex::default);

        // never glue a record onto the fragment of a torn line
        let mut line = Vec::with_capacity(body.len() + 2);
        if index.torn_tail {
            line.push(b'\n');
        }
        line.extend_from_slice(&body);
        line.push(b'\n');

        if let Err(e) = self.append(&line).await {
            index.torn_tail = true;
            return Err(e);
        }
        index.torn_tail = false;
        index.insert(record);
        Ok(())
    }

    async fn was_delivered(&self, recipient: &str) -> Result<HashSet<String>> {
        let mut slot = self.index.lock().await;
        if slot.is_none() {
            *slot = Some(self.load_index().await?);
        }
        Ok(slot
            .as_ref()
            .and_then(|index| index.delivered.get(recipient))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::NewsItem;

    #[tokio::test]
    async fn preferences_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("preferences.json");

        let s = JsonPreferenceStore::open(&path).await.unwrap();
        s.set("U2", vec!["運動".into()]).await.unwrap();
        assert!(s.toggle("U1", "政治").await.unwrap());
        assert!(s.toggle("U1", "國際").await.unwrap());
        drop(s);

        let s = JsonPreferenceStore::open(&path).await.unwrap();
        assert_eq!(s.get("U1").await.unwrap(), vec!["政治", "國際"]);
        assert_eq!(s.recipients().await.unwrap(), vec!["U1", "U2"]);
    }

    #[tokio::test]
    async fn corrupt_preferences_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonPreferenceStore::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn ledger_appends_and_skips_torn_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deliveries.jsonl");
        let l = JsonLedger::new(&path);
        assert!(l.was_delivered("U1").await.unwrap().is_empty());

        let now = Utc::now();
        for id in ["n1", "n2"] {
            let item = NewsItem::new(id, "政治", id);
            l.record_delivery(DeliveryRecord::for_item("U1", &item, now))
                .await
                .unwrap();
        }
        let other = NewsItem::new("n3", "政治", "n3");
        l.record_delivery(DeliveryRecord::for_item("U2", &other, now))
            .await
            .unwrap();
        drop(l);

        // crash mid-append, cutting a multi-byte title in half
        let mut raw = std::fs::read(&path).unwrap();
        raw.extend_from_slice(b"{\"recipient_id\":\"U1\",\"title\":\"");
        raw.extend_from_slice(&"政".as_bytes()[..2]);
        std::fs::write(&path, raw).unwrap();

        let l = JsonLedger::new(&path);
        let ids = l.was_delivered("U1").await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("n1") && ids.contains("n2"));

        // the next append after restart must land on its own line
        let next = NewsItem::new("n4", "社會", "n4");
        l.record_delivery(DeliveryRecord::for_item("U1", &next, now))
            .await
            .unwrap();
        assert!(l.was_delivered("U1").await.unwrap().contains("n4"));
        drop(l);

        let reopened = JsonLedger::new(&path);
        let ids = reopened.was_delivered("U1").await.unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("n4"));
        assert_eq!(reopened.was_delivered("U2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ledger_reads_the_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deliveries.jsonl");
        let l = JsonLedger::new(&path);
        let item = NewsItem::new("n1", "政治", "n1");
        l.record_delivery(DeliveryRecord::for_item("U1", &item, Utc::now()))
            .await
            .unwrap();

        // later lookups are served from the index, not the file
        std::fs::remove_file(&path).unwrap();
        assert!(l.was_delivered("U1").await.unwrap().contains("n1"));
        assert!(l.was_delivered("U2").await.unwrap().is_empty());
    }
}
