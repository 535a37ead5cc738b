//! Two-level cache: a bounded inner policy backed by a larger, reclaimable
//! tier of clean values.
//!
//! Entries pushed out of the inner cache are handed to this cache's listeners
//! at that moment and then kept in the reclaimable tier, which drops its
//! least recently used values when full without notifying anyone. Dirty
//! entries only ever live in the inner cache.

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::cache::policy::{CacheEntry, CachePolicy, CachePolicyListener, CacheEvictionError};
use crate::record::{Object, RecordId, SerializerRef};

type Reclaimable = Mutex<LruCache<RecordId, (Object, SerializerRef)>>;
type Listeners = Mutex<Vec<Arc<dyn CachePolicyListener>>>;

/// Listener on the inner cache that forwards evictions and demotes the
/// evicted value into the reclaimable tier.
struct Demote {
    reclaimable: Arc<Reclaimable>,
    listeners: Arc<Listeners>,
}

impl CachePolicyListener for Demote {
    fn cache_object_evicted(&self, entry: &CacheEntry) -> Result<(), CacheEvictionError> {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.cache_object_evicted(entry)?;
        }
        self.reclaimable
            .lock()
            .put(entry.key, (entry.value.clone(), entry.serializer.clone()));
        Ok(())
    }
}

pub struct SoftCache<P> {
    inner: P,
    reclaimable: Arc<Reclaimable>,
    listeners: Arc<Listeners>,
}

impl<P: CachePolicy> SoftCache<P> {
    pub fn new(inner: P, reclaimable_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(reclaimable_capacity).unwrap_or(NonZeroUsize::MIN);
        let reclaimable = Arc::new(Mutex::new(LruCache::new(capacity)));
        let listeners: Arc<Listeners> = Arc::new(Mutex::new(Vec::new()));

        inner.add_listener(Arc::new(Demote {
            reclaimable: reclaimable.clone(),
            listeners: listeners.clone(),
        }));

        Self {
            inner,
            reclaimable,
            listeners,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Values currently held only in the reclaimable tier.
    pub fn reclaimable_len(&self) -> usize {
        self.reclaimable.lock().len()
    }
}

impl<P: CachePolicy> CachePolicy for SoftCache<P> {
    fn put(
        &self,
        key: RecordId,
        value: Object,
        dirty: bool,
        serializer: SerializerRef,
    ) -> Result<(), CacheEvictionError> {
        self.reclaimable.lock().pop(&key);
        self.inner.put(key, value, dirty, serializer)
    }

    fn get(&self, key: RecordId) -> Option<Object> {
        if let Some(value) = self.inner.get(key) {
            return Some(value);
        }

        let (value, serializer) = self.reclaimable.lock().pop(&key)?;
        if let Err(e) = self.inner.put(key, value.clone(), false, serializer.clone()) {
            // Keep the value reachable even though it could not be promoted
            debug!("could not promote record {}: {}", key, e);
            self.reclaimable.lock().put(key, (value.clone(), serializer));
        }
        Some(value)
    }

    fn remove(&self, key: RecordId) -> Option<CacheEntry> {
        let reclaimed = self.reclaimable.lock().pop(&key);
        self.inner.remove(key).or_else(|| {
            reclaimed.map(|(value, serializer)| CacheEntry {
                key,
                value,
                dirty: false,
                serializer,
            })
        })
    }

    fn remove_all(&self) {
        self.inner.remove_all();
        self.reclaimable.lock().clear();
    }

    fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .reclaimable
            .lock()
            .iter()
            .rev()
            .map(|(&key, (value, serializer))| CacheEntry {
                key,
                value: value.clone(),
                dirty: false,
                serializer: serializer.clone(),
            })
            .collect();
        entries.extend(self.inner.entries());
        entries
    }

    fn mark_clean(&self, key: RecordId) {
        self.inner.mark_clean(key);
    }

    fn add_listener(&self, listener: Arc<dyn CachePolicyListener>) {
        self.listeners.lock().push(listener);
    }

    fn len(&self) -> usize {
        self.inner.len() + self.reclaimable.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MruCache;
    use crate::record::bytes_serializer;

    fn value(n: u8) -> Object {
        Arc::new(vec![n])
    }

    #[derive(Default)]
    struct Recorder {
        evicted: Mutex<Vec<(u64, bool)>>,
    }

    impl CachePolicyListener for Recorder {
        fn cache_object_evicted(&self, entry: &CacheEntry) -> Result<(), CacheEvictionError> {
            self.evicted.lock().push((entry.key.0, entry.dirty));
            Ok(())
        }
    }

    #[test]
    fn test_eviction_notifies_and_demotes() {
        let cache = SoftCache::new(MruCache::new(2), 10);
        let recorder = Arc::new(Recorder::default());
        cache.add_listener(recorder.clone());

        cache.put(RecordId(1), value(1), true, bytes_serializer()).unwrap();
        cache.put(RecordId(2), value(2), false, bytes_serializer()).unwrap();
        cache.put(RecordId(3), value(3), false, bytes_serializer()).unwrap();

        // Notified when pushed out of the inner cache
        assert_eq!(*recorder.evicted.lock(), vec![(1, true)]);
        assert_eq!(cache.inner().len(), 2);
        assert_eq!(cache.reclaimable_len(), 1);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_reclaimable_hit_is_promoted_clean() {
        let cache = SoftCache::new(MruCache::new(2), 10);
        cache.put(RecordId(1), value(1), true, bytes_serializer()).unwrap();
        cache.put(RecordId(2), value(2), false, bytes_serializer()).unwrap();
        cache.put(RecordId(3), value(3), false, bytes_serializer()).unwrap();

        let promoted = cache.get(RecordId(1));
        assert_eq!(
            promoted.as_ref().and_then(|v| v.downcast_ref::<Vec<u8>>()),
            Some(&vec![1])
        );

        let inner: Vec<CacheEntry> = cache.inner().entries();
        let entry = inner.iter().find(|e| e.key == RecordId(1));
        assert_eq!(entry.map(|e| e.dirty), Some(false));
        // Promotion pushed 2 out of the inner cache
        assert!(cache.inner().entries().iter().all(|e| e.key != RecordId(2)));
        assert!(cache.get(RecordId(2)).is_some());
    }

    #[test]
    fn test_reclaimable_tier_is_bounded() {
        let cache = SoftCache::new(MruCache::new(1), 2);
        for key in 1..=5 {
            cache.put(RecordId(key), value(key as u8), false, bytes_serializer()).unwrap();
        }
        assert_eq!(cache.reclaimable_len(), 2);
        assert!(cache.get(RecordId(1)).is_none());
        assert!(cache.get(RecordId(4)).is_some());
    }

    #[test]
    fn test_remove_all_clears_both_tiers() {
        let cache = SoftCache::new(MruCache::new(1), 4);
        cache.put(RecordId(1), value(1), false, bytes_serializer()).unwrap();
        cache.put(RecordId(2), value(2), false, bytes_serializer()).unwrap();
        assert_eq!(cache.entries().len(), 2);

        assert_eq!(cache.remove(RecordId(1)).map(|e| e.dirty), Some(false));
        cache.remove_all();
        assert!(cache.is_empty());
    }
}
