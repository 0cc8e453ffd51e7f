// src/lib.rs
// Public library surface for the runner binary and integration tests.

pub mod allocator;
pub mod catalog;
pub mod config;
pub mod item;
pub mod logging;
pub mod novelty;
pub mod scheduler;

// Collaborators around the allocator
pub mod dispatch;
pub mod feed;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::allocator::{allocate, allocate_with_stats, AllocError, Allocation, AllocationStats};
pub use crate::catalog::{Catalog, CatalogError};
pub use crate::config::PushConfig;
pub use crate::dispatch::{BatchReport, Dispatcher, Outcome};
pub use crate::item::{DeliveryRecord, NewsItem, RecipientPreference};
pub use crate::store::{DeliveryLedger, PreferenceStore};
