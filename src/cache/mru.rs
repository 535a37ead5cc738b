//! Bounded cache evicting the least recently used entry.
//!
//! Entries live in an arena of slots linked into a list ordered from least to
//! most recently used. Listeners run without the lock held and may call back
//! into the cache. While any eviction is in progress new entries get fresh
//! slots, so the cache can temporarily exceed its capacity; the outermost
//! `put` evicts down to capacity before it returns.

use log::trace;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::policy::{CacheEntry, CachePolicy, CachePolicyListener, CacheEvictionError};
use crate::record::{Object, RecordId, SerializerRef};

struct Node {
    entry: CacheEntry,
    prev: Option<usize>,
    next: Option<usize>,
    /// Bumped on every touch, so an eviction can tell whether its victim was
    /// used while listeners ran.
    version: u64,
}

#[derive(Default)]
struct Lru {
    slots: Vec<Option<Node>>,
    free_slots: Vec<usize>,
    map: HashMap<RecordId, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    clock: u64,
    /// Evictions whose listeners are currently running.
    evicting: usize,
}

impl Lru {
    fn node(&self, slot: usize) -> Option<&Node> {
        self.slots.get(slot).and_then(|node| node.as_ref())
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node> {
        self.slots.get_mut(slot).and_then(|node| node.as_mut())
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn unlink(&mut self, slot: usize) {
        let Some((prev, next)) = self.node(slot).map(|node| (node.prev, node.next)) else {
            return;
        };
        match prev {
            Some(prev) => {
                if let Some(node) = self.node_mut(prev) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next) => {
                if let Some(node) = self.node_mut(next) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = None;
        }
    }

    fn push_back(&mut self, slot: usize) {
        let tail = self.tail;
        let version = self.tick();
        if let Some(node) = self.node_mut(slot) {
            node.prev = tail;
            node.next = None;
            node.version = version;
        }
        match tail {
            Some(tail) => {
                if let Some(node) = self.node_mut(tail) {
                    node.next = Some(slot);
                }
            }
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }

    fn touch(&mut self, slot: usize) {
        self.unlink(slot);
        self.push_back(slot);
    }

    fn insert(&mut self, entry: CacheEntry) {
        let key = entry.key;
        let node = Node {
            entry,
            prev: None,
            next: None,
            version: 0,
        };
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.map.insert(key, slot);
        self.push_back(slot);
    }

    fn remove(&mut self, key: RecordId) -> Option<CacheEntry> {
        let slot = self.map.remove(&key)?;
        self.unlink(slot);
        let node = self.slots.get_mut(slot)?.take()?;
        self.free_slots.push(slot);
        Some(node.entry)
    }

    fn clear(&mut self) {
        let clock = self.clock;
        let evicting = self.evicting;
        *self = Lru::default();
        self.clock = clock;
        self.evicting = evicting;
    }
}

pub struct MruCache {
    capacity: usize,
    lru: Mutex<Lru>,
    listeners: Mutex<Vec<Arc<dyn CachePolicyListener>>>,
}

impl MruCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lru: Mutex::new(Lru::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn notify(&self, entry: &CacheEntry) -> Result<(), CacheEvictionError> {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.cache_object_evicted(entry)?;
        }
        Ok(())
    }
}

impl CachePolicy for MruCache {
    fn put(
        &self,
        key: RecordId,
        value: Object,
        dirty: bool,
        serializer: SerializerRef,
    ) -> Result<(), CacheEvictionError> {
        let entry = CacheEntry {
            key,
            value,
            dirty,
            serializer,
        };

        loop {
            let mut lru = self.lru.lock();

            if let Some(&slot) = lru.map.get(&key) {
                if let Some(node) = lru.node_mut(slot) {
                    // A clean put never clears a pending write
                    let dirty = entry.dirty || node.entry.dirty;
                    node.entry = entry;
                    node.entry.dirty = dirty;
                }
                lru.touch(slot);
                return Ok(());
            }

            if lru.map.len() < self.capacity || lru.evicting > 0 {
                lru.insert(entry);
                return Ok(());
            }

            let Some(victim_slot) = lru.head else {
                lru.insert(entry);
                return Ok(());
            };
            let Some((victim, version)) = lru
                .node(victim_slot)
                .map(|node| (node.entry.clone(), node.version))
            else {
                lru.insert(entry);
                return Ok(());
            };

            lru.evicting += 1;
            drop(lru);
            let notified = self.notify(&victim);
            let mut lru = self.lru.lock();
            lru.evicting -= 1;
            notified?;

            // Skip the victim if a listener touched or replaced it meanwhile
            let unchanged = lru
                .node(victim_slot)
                .map_or(false, |node| node.version == version && node.entry.key == victim.key);
            if unchanged {
                lru.remove(victim.key);
                trace!("evicted record {} from cache", victim.key);
            }
        }
    }

    fn get(&self, key: RecordId) -> Option<Object> {
        let mut lru = self.lru.lock();
        let slot = *lru.map.get(&key)?;
        lru.touch(slot);
        lru.node(slot).map(|node| node.entry.value.clone())
    }

    fn remove(&self, key: RecordId) -> Option<CacheEntry> {
        self.lru.lock().remove(key)
    }

    fn remove_all(&self) {
        self.lru.lock().clear();
    }

    fn entries(&self) -> Vec<CacheEntry> {
        let lru = self.lru.lock();
        let mut entries = Vec::with_capacity(lru.map.len());
        let mut cursor = lru.head;
        while let Some(slot) = cursor {
            let Some(node) = lru.node(slot) else {
                break;
            };
            entries.push(node.entry.clone());
            cursor = node.next;
        }
        entries
    }

    fn mark_clean(&self, key: RecordId) {
        let mut lru = self.lru.lock();
        if let Some(&slot) = lru.map.get(&key) {
            if let Some(node) = lru.node_mut(slot) {
                node.entry.dirty = false;
            }
        }
    }

    fn add_listener(&self, listener: Arc<dyn CachePolicyListener>) {
        self.listeners.lock().push(listener);
    }

    fn len(&self) -> usize {
        self.lru.lock().map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::bytes_serializer;
    use crate::storage::StorageError;
    use std::sync::Weak;

    fn value(n: u8) -> Object {
        Arc::new(vec![n])
    }

    fn keys(cache: &MruCache) -> Vec<u64> {
        cache.entries().iter().map(|entry| entry.key.0).collect()
    }

    /// Records the keys it is told about.
    #[derive(Default)]
    struct Recorder {
        evicted: Mutex<Vec<u64>>,
    }

    impl CachePolicyListener for Recorder {
        fn cache_object_evicted(&self, entry: &CacheEntry) -> Result<(), CacheEvictionError> {
            self.evicted.lock().push(entry.key.0);
            Ok(())
        }
    }

    struct Veto;

    impl CachePolicyListener for Veto {
        fn cache_object_evicted(&self, entry: &CacheEntry) -> Result<(), CacheEvictionError> {
            Err(CacheEvictionError::new(entry.key, StorageError::Closed))
        }
    }

    /// Puts another key into the same cache while an eviction is running.
    struct Reentrant {
        cache: Weak<MruCache>,
        fired: Mutex<bool>,
    }

    impl CachePolicyListener for Reentrant {
        fn cache_object_evicted(&self, _entry: &CacheEntry) -> Result<(), CacheEvictionError> {
            let mut fired = self.fired.lock();
            if *fired {
                return Ok(());
            }
            *fired = true;
            drop(fired);
            if let Some(cache) = self.cache.upgrade() {
                cache.put(RecordId(100), value(100), false, bytes_serializer())?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = MruCache::new(3);
        let recorder = Arc::new(Recorder::default());
        cache.add_listener(recorder.clone());

        for key in 1..=3 {
            cache.put(RecordId(key), value(key as u8), false, bytes_serializer()).unwrap();
        }
        // Touch 1 so that 2 becomes the oldest
        assert!(cache.get(RecordId(1)).is_some());
        cache.put(RecordId(4), value(4), false, bytes_serializer()).unwrap();

        assert_eq!(*recorder.evicted.lock(), vec![2]);
        assert_eq!(keys(&cache), vec![3, 1, 4]);
        assert!(cache.get(RecordId(2)).is_none());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_capacity_plus_one_evicts_first_key() {
        let cache = MruCache::new(5);
        let recorder = Arc::new(Recorder::default());
        cache.add_listener(recorder.clone());

        for key in 1..=6 {
            cache.put(RecordId(key), value(key as u8), false, bytes_serializer()).unwrap();
        }
        assert_eq!(*recorder.evicted.lock(), vec![1]);
        assert_eq!(keys(&cache), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_update_keeps_single_entry() {
        let cache = MruCache::new(2);
        cache.put(RecordId(1), value(1), true, bytes_serializer()).unwrap();
        cache.put(RecordId(1), value(2), false, bytes_serializer()).unwrap();

        assert_eq!(cache.len(), 1);
        let entries = cache.entries();
        assert!(entries[0].dirty);
        assert_eq!(entries[0].value.downcast_ref::<Vec<u8>>(), Some(&vec![2]));

        cache.mark_clean(RecordId(1));
        assert!(!cache.entries()[0].dirty);
    }

    #[test]
    fn test_veto_leaves_cache_unchanged() {
        let cache = MruCache::new(2);
        cache.put(RecordId(1), value(1), true, bytes_serializer()).unwrap();
        cache.put(RecordId(2), value(2), true, bytes_serializer()).unwrap();
        cache.add_listener(Arc::new(Veto));

        let result = cache.put(RecordId(3), value(3), true, bytes_serializer());
        assert!(matches!(result, Err(CacheEvictionError { key: RecordId(1), .. })));
        assert_eq!(keys(&cache), vec![1, 2]);
    }

    #[test]
    fn test_reentrant_put_during_eviction() {
        let cache = Arc::new(MruCache::new(2));
        let listener = Arc::new(Reentrant {
            cache: Arc::downgrade(&cache),
            fired: Mutex::new(false),
        });
        cache.add_listener(listener);

        cache.put(RecordId(1), value(1), false, bytes_serializer()).unwrap();
        cache.put(RecordId(2), value(2), false, bytes_serializer()).unwrap();
        cache.put(RecordId(3), value(3), false, bytes_serializer()).unwrap();

        // The reentrant put got a fresh slot; the outer put then evicted down
        // to capacity, oldest first.
        assert_eq!(cache.len(), 2);
        assert_eq!(keys(&cache), vec![100, 3]);
        for entry in cache.entries() {
            let expected = entry.key.0 as u8;
            assert_eq!(entry.value.downcast_ref::<Vec<u8>>(), Some(&vec![expected]));
        }
    }

    #[test]
    fn test_remove_and_remove_all() {
        let cache = MruCache::new(4);
        for key in 1..=3 {
            cache.put(RecordId(key), value(key as u8), false, bytes_serializer()).unwrap();
        }
        assert_eq!(cache.remove(RecordId(2)).map(|e| e.key), Some(RecordId(2)));
        assert_eq!(keys(&cache), vec![1, 3]);

        // Freed slots are reused
        cache.put(RecordId(4), value(4), false, bytes_serializer()).unwrap();
        assert_eq!(keys(&cache), vec![1, 3, 4]);

        cache.remove_all();
        assert!(cache.is_empty());
        assert!(cache.entries().is_empty());
    }
}
