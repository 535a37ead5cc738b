use std::error::Error;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::record::{Object, RecordId, SerializerRef};

/// A cached object with the serializer needed to write it back.
#[derive(Clone)]
pub struct CacheEntry {
    pub key: RecordId,
    pub value: Object,
    /// Not yet written to the underlying store.
    pub dirty: bool,
    pub serializer: SerializerRef,
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("dirty", &self.dirty)
            .field("serializer", &self.serializer.name())
            .finish()
    }
}

/// A listener refused an eviction, usually because writing the entry back failed.
#[derive(Error, Debug)]
#[error("eviction of record {key} failed: {source}")]
pub struct CacheEvictionError {
    pub key: RecordId,
    #[source]
    pub source: Box<dyn Error + Send + Sync>,
}

impl CacheEvictionError {
    pub fn new(key: RecordId, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self {
            key,
            source: source.into(),
        }
    }
}

/// Notified before an entry leaves a cache. Returning an error vetoes the
/// eviction and fails the `put` that caused it.
pub trait CachePolicyListener: Send + Sync {
    fn cache_object_evicted(&self, entry: &CacheEntry) -> Result<(), CacheEvictionError>;
}

/// Replacement policy for cached objects, keyed by record id.
///
/// Methods take `&self` so that listeners may call back into the cache while
/// an eviction is in progress.
pub trait CachePolicy: Send + Sync {
    /// Caches `value` for `key`, evicting if the cache is full.
    fn put(
        &self,
        key: RecordId,
        value: Object,
        dirty: bool,
        serializer: SerializerRef,
    ) -> Result<(), CacheEvictionError>;

    fn get(&self, key: RecordId) -> Option<Object>;

    /// Removes `key` without notifying listeners.
    fn remove(&self, key: RecordId) -> Option<CacheEntry>;

    /// Drops every entry without notifying listeners.
    fn remove_all(&self);

    /// Snapshot of the cached entries, least recently used first.
    fn entries(&self) -> Vec<CacheEntry>;

    /// Clears the dirty flag of `key` after it has been written back.
    fn mark_clean(&self, key: RecordId);

    fn add_listener(&self, listener: Arc<dyn CachePolicyListener>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
