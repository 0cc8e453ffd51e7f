//! Novelty filter and category bucketing used by the allocator.
//!
//! Both helpers borrow from the caller's candidate slice; nothing is cloned
//! until the allocator has settled on its final selection.

use std::collections::{HashMap, HashSet};

use crate::item::NewsItem;

/// Candidates that survived the novelty filter, in input order.
#[derive(Debug, Default)]
pub struct Novel<'a> {
    pub items: Vec<&'a NewsItem>,
    /// Dropped because the recipient already received them.
    pub excluded: usize,
    /// Dropped because an earlier candidate had the same id.
    pub duplicates: usize,
}

/// Drop already-delivered candidates and later repeats of an id.
pub fn filter_novel<'a>(candidates: &'a [NewsItem], already_delivered: &HashSet<String>) -> Novel<'a> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(candidates.len());
    let mut out = Novel {
        items: Vec::with_capacity(candidates.len()),
        ..Novel::default()
    };

    for item in candidates {
        if !seen.insert(item.id.as_str()) {
            out.duplicates += 1;
            continue;
        }
        if already_delivered.contains(&item.id) {
            out.excluded += 1;
            continue;
        }
        out.items.push(item);
    }
    out
}

/// Priority-ordered preferred categories with repeats removed.
pub fn priority_order<S: AsRef<str>>(preferred: &[S]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::with_capacity(preferred.len());
    for c in preferred {
        let c = c.as_ref();
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Novel candidates split by preferred category.
#[derive(Debug)]
pub struct Buckets<'a> {
    /// One bucket per preferred category, in priority order.
    pub preferred: Vec<Vec<&'a NewsItem>>,
    /// Candidates outside every preferred category.
    pub fallback: Vec<&'a NewsItem>,
}

pub fn bucket_by_category<'a>(novel: &[&'a NewsItem], priorities: &[&str]) -> Buckets<'a> {
    let index: HashMap<&str, usize> = priorities
        .iter()
        .enumerate()
        .map(|(i, c)| (*c, i))
        .collect();

    let mut preferred: Vec<Vec<&'a NewsItem>> = vec![Vec::new(); priorities.len()];
    let mut fallback = Vec::new();

    for &item in novel {
        match index.get(item.category.as_str()) {
            Some(&i) => preferred[i].push(item),
            None => fallback.push(item),
        }
    }

    Buckets { preferred, fallback }
}
