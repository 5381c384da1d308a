//! Listing Cache
//!
//! Freshness state machine over the persisted `CacheEntry` records plus the
//! two `Store` implementations: SQLite for real runs and an in-memory map
//! for tests and dry runs.

pub mod cache;
pub mod memory;
pub mod sqlite;

pub use cache::{CacheConfig, CacheDiff, ChangeKind, ListingCache, ListingChange};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
