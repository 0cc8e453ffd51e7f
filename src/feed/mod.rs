// src/feed/mod.rs
pub mod json;

use std::collections::HashSet;

use anyhow::Result;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::item::NewsItem;

pub use json::JsonFeed;

/// Anything that can hand out the current pool of candidate items,
/// newest first.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>>;
    fn name(&self) -> &str;
}

/// Fixed list of items; useful for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    items: Vec<NewsItem>,
}

impl StaticFeed {
    pub fn new(items: Vec<NewsItem>) -> Self {
        Self { items }
    }
}

#[async_trait::async_trait]
impl FeedSource for StaticFeed {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        Ok(self.items.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Clean up a headline: strip CDATA markers and tags, decode entities,
/// collapse whitespace.
pub fn normalize_title(s: &str) -> String {
    // 1) CDATA wrappers, including the half-stripped `![CDATA[` variant
    let mut out = s
        .replace("<![CDATA[", "")
        .replace("![CDATA[", "")
        .replace("]]>", "");

    // 2) HTML entity decode
    out = html_escape::decode_html_entities(&out).to_string();

    // 3) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Feed-boundary cleanup: normalize text fields, drop items without an id,
/// keep the first item per id. Order is preserved.
/// Returns `(items, dropped_without_id, dropped_duplicates)`.
pub fn prepare_items(raw: Vec<NewsItem>) -> (Vec<NewsItem>, usize, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut out = Vec::with_capacity(raw.len());
    let mut no_id = 0usize;
    let mut dups = 0usize;

    for mut it in raw {
        it.id = it.id.trim().to_string();
        if it.id.is_empty() {
            no_id += 1;
            continue;
        }
        if !seen.insert(it.id.clone()) {
            dups += 1;
            continue;
        }
        it.title = normalize_title(&it.title);
        it.category = it.category.trim().to_string();
        it.link = it.link.trim().to_string();
        it.thumbnail = it.thumbnail.trim().to_string();
        out.push(it);
    }

    (out, no_id, dups)
}

/// The first `count` items of `category`, in feed order (feeds list newest
/// first). The category must already be canonical.
pub fn latest_in_category(items: &[NewsItem], category: &str, count: usize) -> Vec<NewsItem> {
    items
        .iter()
        .filter(|it| it.category == category)
        .take(count)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_cdata_and_entities_are_cleaned() {
        assert_eq!(
            normalize_title("![CDATA[ 颱風&nbsp;&nbsp;接近 <b>北部</b> ]]>"),
            "颱風 接近 北部"
        );
        assert_eq!(normalize_title("<![CDATA[A &amp; B]]>"), "A & B");
        assert_eq!(normalize_title("   "), "");
    }

    #[test]
    fn prepare_keeps_first_id_and_drops_blank_ids() {
        let raw = vec![
            NewsItem::new("1", " 政治 ", "a"),
            NewsItem::new("", "政治", "b"),
            NewsItem::new(" 1 ", "社會", "c"),
            NewsItem::new("2", "社會", "d"),
        ];
        let (items, no_id, dups) = prepare_items(raw);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].category, "政治");
        assert_eq!(items[1].id, "2");
        assert_eq!((no_id, dups), (1, 1));
    }

    #[test]
    fn category_lookup_keeps_feed_order_and_caps() {
        let items = vec![
            NewsItem::new("p1", "政治", "a"),
            NewsItem::new("s1", "運動", "b"),
            NewsItem::new("p2", "政治", "c"),
            NewsItem::new("p3", "政治", "d"),
        ];
        let ids = |v: Vec<NewsItem>| v.into_iter().map(|i| i.id).collect::<Vec<_>>();

        assert_eq!(ids(latest_in_category(&items, "政治", 2)), vec!["p1", "p2"]);
        assert_eq!(ids(latest_in_category(&items, "政治", 10)), vec!["p1", "p2", "p3"]);
        assert!(latest_in_category(&items, "氣象", 5).is_empty());
        assert!(latest_in_category(&items, "政治", 0).is_empty());
    }
}
