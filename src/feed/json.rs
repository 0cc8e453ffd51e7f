// src/feed/json.rs
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{prepare_items, FeedSource};
use crate::item::NewsItem;

enum Origin {
    Inline(String),
    File(PathBuf),
}

/// Feed backed by a JSON array of items, either an inline fixture or a file
/// re-read on every fetch (an external fetcher keeps it fresh).
pub struct JsonFeed {
    origin: Origin,
}

impl JsonFeed {
    pub fn from_fixture(content: &str) -> Self {
        Self {
            origin: Origin::Inline(content.to_string()),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            origin: Origin::File(path.into()),
        }
    }
}

#[async_trait]
impl FeedSource for JsonFeed {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        let rows: Vec<Value> = match &self.origin {
            Origin::Inline(s) => serde_json::from_str(s).context("parsing inline feed json")?,
            Origin::File(p) => {
                let s = tokio::fs::read_to_string(p)
                    .await
                    .with_context(|| format!("reading feed from {}", p.display()))?;
                serde_json::from_str(&s)
                    .with_context(|| format!("parsing feed json from {}", p.display()))?
            }
        };

        let (raw, unreadable) = decode_rows(rows);
        let (items, no_id, dups) = prepare_items(raw);
        tracing::debug!(
            target: "feed",
            feed = self.name(),
            kept = items.len(),
            unreadable,
            no_id,
            dups,
            "feed fetched"
        );
        Ok(items)
    }

    fn name(&self) -> &str {
        match self.origin {
            Origin::Inline(_) => "json-fixture",
            Origin::File(_) => "json-file",
        }
    }
}

/// Decode each row on its own so one malformed entry cannot sink the pool.
fn decode_rows(rows: Vec<Value>) -> (Vec<NewsItem>, usize) {
    let mut items = Vec::with_capacity(rows.len());
    let mut unreadable = 0usize;
    for (i, row) in rows.into_iter().enumerate() {
        match serde_json::from_value::<NewsItem>(row) {
            Ok(it) => items.push(it),
            Err(e) => {
                unreadable += 1;
                warn!(target: "feed", row = i, "skipping unreadable feed item: {e}");
            }
        }
    }
    (items, unreadable)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"[
        {"ID":"202410160001","title":"![CDATA[颱風逼近]]>","category":"氣象","publishTimeUnix":1729036800000,"sourceUrl":"https://news.example/1"},
        {"ID":"202410160002","title":"立院三讀","category":"政治"},
        {"ID":"202410160001","title":"dup","category":"政治"},
        {"title":"no id"}
    ]"#;

    #[tokio::test]
    async fn fixture_is_parsed_and_cleaned() {
        let feed = JsonFeed::from_fixture(FIXTURE);
        let items = feed.fetch_latest().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "颱風逼近");
        assert_eq!(items[0].link, "https://news.example/1");
        assert!(items[0].published_at.is_some());
        assert_eq!(items[1].thumbnail, "");
    }

    #[tokio::test]
    async fn null_fields_and_bad_rows_do_not_sink_the_feed() {
        let feed = JsonFeed::from_fixture(
            r#"[
            {"ID":"1","title":"地震","category":"社會","thumbnail":null,"sourceUrl":null},
            "not an item",
            {"ID":"2","title":null,"category":"政治","publishTimeUnix":null}
        ]"#,
        );
        let items = feed.fetch_latest().await.unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(items[0].thumbnail, "");
        assert_eq!(items[1].title, "");
    }

    #[tokio::test]
    async fn non_array_document_is_an_error() {
        let feed = JsonFeed::from_fixture(r#"{"ID":"1"}"#);
        assert!(feed.fetch_latest().await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let feed = JsonFeed::from_path("/definitely/not/here.json");
        assert!(feed.fetch_latest().await.is_err());
    }
}
