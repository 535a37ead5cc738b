//! Object caches.
//!
//! - **MruCache**: bounded cache evicting the least recently used entry
//! - **SoftCache**: bounded cache backed by a reclaimable tier of clean values
//! - **CacheRecordManager**: write-back [`RecordManager`](crate::record::RecordManager)
//!   decorator that installs dirty entries on eviction and commit

pub mod mru;
pub mod policy;
pub mod soft;
pub mod write_back;

pub use mru::MruCache;
pub use policy::{CacheEntry, CacheEvictionError, CachePolicy, CachePolicyListener};
pub use soft::SoftCache;
pub use write_back::CacheRecordManager;
