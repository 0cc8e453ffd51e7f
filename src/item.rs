//! # Data model
//! News items as they come out of a feed, recipient preferences, and
//! delivery records appended to the ledger.
//!
//! Feeds are noisy: any field may be missing, and publish times show up as
//! RFC 3339 strings, millisecond unix timestamps, or empty strings. Missing,
//! `null` or oddly typed values deserialize to empty sentinels (`""` / `None`)
//! and never fail.

use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// A single candidate news item. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Stable identifier, unique within one fetch cycle.
    #[serde(default, alias = "ID", deserialize_with = "deserialize_text")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub category: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub title: String,
    #[serde(
        default,
        alias = "publishTimeUnix",
        alias = "published",
        deserialize_with = "deserialize_published"
    )]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "sourceUrl", deserialize_with = "deserialize_text")]
    pub link: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub thumbnail: String,
}

impl NewsItem {
    pub fn new(id: impl Into<String>, category: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            title: title.into(),
            published_at: None,
            link: String::new(),
            thumbnail: String::new(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = thumbnail.into();
        self
    }

    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}

/// Ordered category preferences of one recipient (insertion order = priority).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientPreference {
    pub recipient_id: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl RecipientPreference {
    pub fn new(recipient_id: impl Into<String>, categories: Vec<String>, at: DateTime<Utc>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            categories: dedup_categories(categories),
            last_updated: at,
        }
    }
}

/// One append-only ledger row: `item_id` was delivered to `recipient_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub recipient_id: String,
    pub item_id: String,
    pub delivered_at: DateTime<Utc>,
    // diagnostics only
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
}

impl DeliveryRecord {
    pub fn for_item(recipient_id: &str, item: &NewsItem, at: DateTime<Utc>) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            item_id: item.id.clone(),
            delivered_at: at,
            title: item.title.clone(),
            category: item.category.clone(),
        }
    }
}

/// Trim, drop empties and drop repeats while keeping first-seen order.
pub fn dedup_categories<I, S>(categories: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for c in categories {
        let c = c.as_ref().trim();
        if !c.is_empty() && !out.iter().any(|x| x == c) {
            out.push(c.to_string());
        }
    }
    out
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawText {
    Text(String),
    Int(i64),
    Float(f64),
    Other(IgnoredAny),
}

/// Strings pass through, numbers are stringified, anything else is `""`.
fn deserialize_text<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawText::deserialize(de)? {
        RawText::Text(s) => s,
        RawText::Int(n) => n.to_string(),
        RawText::Float(f) => f.to_string(),
        RawText::Other(_) => String::new(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
    Other(IgnoredAny),
}

fn deserialize_published<'de, D>(de: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawTimestamp> = Option::deserialize(de)?;
    Ok(match raw {
        None => None,
        Some(RawTimestamp::Millis(ms)) => DateTime::from_timestamp_millis(ms),
        Some(RawTimestamp::Text(s)) => parse_timestamp_text(&s),
        Some(RawTimestamp::Other(_)) => None,
    })
}

/// Unparseable timestamps become `None` rather than an error.
fn parse_timestamp_text(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ms) = s.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
