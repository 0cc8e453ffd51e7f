//! Known news categories and input validation for preference updates.

use thiserror::Error;

/// Categories published by the default feed, in menu order.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "即時", "氣象", "政治", "MLB", "國際", "社會", "運動", "生活", "財經", "地方", "產業", "綜合",
    "藝文", "旅遊", "專題",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown category {input:?}{}", suggestion_suffix(.suggestion))]
    UnknownCategory {
        input: String,
        suggestion: Option<String>,
    },
}

fn suggestion_suffix(s: &Option<String>) -> String {
    match s {
        Some(s) => format!(" (did you mean {s:?}?)"),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    categories: Vec<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORIES.iter().copied())
    }
}

impl Catalog {
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            categories: crate::item::dedup_categories(categories),
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    /// Map user input to a canonical category name.
    ///
    /// Exact match first, then ASCII case-insensitive ("mlb" → "MLB"). On a
    /// miss the closest known category (Levenshtein over chars) is offered
    /// if it is within half the input length.
    pub fn resolve(&self, input: &str) -> Result<&str, CatalogError> {
        let needle = input.trim();
        if let Some(c) = self.categories.iter().find(|c| c.as_str() == needle) {
            return Ok(c.as_str());
        }
        if let Some(c) = self
            .categories
            .iter()
            .find(|c| c.eq_ignore_ascii_case(needle))
        {
            return Ok(c.as_str());
        }

        let max_distance = (needle.chars().count() / 2).max(1);
        let suggestion = self
            .categories
            .iter()
            .map(|c| (strsim::levenshtein(c, needle), c))
            .filter(|(d, _)| *d <= max_distance)
            .min_by_key(|(d, _)| *d)
            .map(|(_, c)| c.clone());

        Err(CatalogError::UnknownCategory {
            input: needle.to_string(),
            suggestion,
        })
    }
}
