//! # Allocator
//! Pure, deterministic selection of news items for one recipient.
//! No I/O: the caller supplies the candidates, the recipient's ordered
//! category preferences, the ids already delivered, and the output budget.
//!
//! Policy:
//! 1. drop already-delivered candidates (and repeated ids),
//! 2. give every preferred category up to `max(1, budget / n)` items in
//!    priority order,
//! 3. hand out leftover slots one item per category per round-robin pass,
//!    skipping categories that have run dry,
//! 4. fill whatever is still open from non-preferred categories.
//!
//! Within a category the candidate order is kept, so callers pass
//! candidates newest-first.

use std::collections::HashSet;

use thiserror::Error;

use crate::item::NewsItem;
use crate::novelty::{bucket_by_category, filter_novel, priority_order};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Per-phase counts of one allocation, for logs and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    pub base: usize,
    pub remainder: usize,
    /// Items drawn from outside the preference set. With no preferences at
    /// all, every selected item counts here.
    pub fallback: usize,
    pub excluded: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub items: Vec<NewsItem>,
    pub stats: AllocationStats,
}

/// Select at most `budget` items for a recipient.
///
/// Fails only when `budget == 0`. Empty candidates or empty preferences are
/// valid input.
pub fn allocate<S: AsRef<str>>(
    candidates: &[NewsItem],
    preferred_categories: &[S],
    already_delivered: &HashSet<String>,
    budget: usize,
) -> Result<Vec<NewsItem>, AllocError> {
    allocate_with_stats(candidates, preferred_categories, already_delivered, budget).map(|a| a.items)
}

/// Same as [`allocate`] but also reports how each slot was filled.
pub fn allocate_with_stats<S: AsRef<str>>(
    candidates: &[NewsItem],
    preferred_categories: &[S],
    already_delivered: &HashSet<String>,
    budget: usize,
) -> Result<Allocation, AllocError> {
    if budget < 1 {
        return Err(AllocError::InvalidArgument(
            "budget must be at least 1".to_string(),
        ));
    }

    let novel = filter_novel(candidates, already_delivered);
    let mut stats = AllocationStats {
        excluded: novel.excluded,
        duplicates: novel.duplicates,
        ..AllocationStats::default()
    };

    let priorities = priority_order(preferred_categories);
    if priorities.is_empty() {
        let items: Vec<NewsItem> = novel.items.into_iter().take(budget).cloned().collect();
        stats.fallback = items.len();
        return Ok(Allocation { items, stats });
    }

    let buckets = bucket_by_category(&novel.items, &priorities);
    let quota = (budget / priorities.len()).max(1);

    let mut picked: Vec<&NewsItem> = Vec::with_capacity(budget);
    let mut consumed = vec![0usize; priorities.len()];
    let mut remaining = budget;

    // Base round: up to `quota` per category, priority order.
    for (bucket, used) in buckets.preferred.iter().zip(consumed.iter_mut()) {
        if remaining == 0 {
            break;
        }
        let take = quota.min(bucket.len()).min(remaining);
        picked.extend_from_slice(&bucket[..take]);
        *used = take;
        remaining -= take;
    }
    stats.base = picked.len();

    // Remainder round: one per category per pass; dry buckets are skipped.
    while remaining > 0 {
        let mut progressed = false;
        for (bucket, used) in buckets.preferred.iter().zip(consumed.iter_mut()) {
            if remaining == 0 {
                break;
            }
            if let Some(&item) = bucket.get(*used) {
                picked.push(item);
                *used += 1;
                remaining -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    stats.remainder = picked.len() - stats.base;

    // Fallback fill. Ids are re-checked even though buckets never overlap.
    if remaining > 0 {
        let mut used_ids: HashSet<&str> = picked.iter().map(|i| i.id.as_str()).collect();
        for &item in &buckets.fallback {
            if remaining == 0 {
                break;
            }
            if used_ids.insert(item.id.as_str()) {
                picked.push(item);
                remaining -= 1;
                stats.fallback += 1;
            }
        }
    }

    picked.truncate(budget);
    Ok(Allocation {
        items: picked.into_iter().cloned().collect(),
        stats,
    })
}
