//! Write-back object cache in front of a record manager.
//!
//! Inserts and updates only touch the cache. Dirty entries reach the store
//! when the cache evicts them or on `commit`. The underlying manager is shared
//! with the eviction listener, so its lock is never held while the cache is
//! being called.

use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::cache::policy::{CacheEntry, CachePolicy, CachePolicyListener, CacheEvictionError};
use crate::record::{Object, RecordId, RecordManager, SerializerRef};
use crate::storage::error::{StorageError, StorageResult};

/// Writes dirty entries to the store as they are evicted.
struct WriteBack<R> {
    recman: Arc<Mutex<R>>,
}

impl<R: RecordManager> CachePolicyListener for WriteBack<R> {
    fn cache_object_evicted(&self, entry: &CacheEntry) -> Result<(), CacheEvictionError> {
        if !entry.dirty {
            return Ok(());
        }
        self.recman
            .lock()
            .update(entry.key, &entry.value, &entry.serializer)
            .map_err(|e| CacheEvictionError::new(entry.key, e))
    }
}

pub struct CacheRecordManager<R: RecordManager> {
    recman: Arc<Mutex<R>>,
    cache: Arc<dyn CachePolicy>,
    closed: bool,
}

impl<R: RecordManager + 'static> CacheRecordManager<R> {
    pub fn new(recman: R, cache: Arc<dyn CachePolicy>) -> Self {
        let recman = Arc::new(Mutex::new(recman));
        cache.add_listener(Arc::new(WriteBack {
            recman: recman.clone(),
        }));
        Self {
            recman,
            cache,
            closed: false,
        }
    }
}

impl<R: RecordManager> CacheRecordManager<R> {
    pub fn cache(&self) -> &Arc<dyn CachePolicy> {
        &self.cache
    }

    /// Runs `f` against the wrapped manager, bypassing the cache.
    pub fn with_inner<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        f(&mut self.recman.lock())
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    /// Writes every dirty entry to the store, leaving it cached as clean.
    fn flush(&mut self) -> StorageResult<()> {
        let dirty: Vec<CacheEntry> = self
            .cache
            .entries()
            .into_iter()
            .filter(|entry| entry.dirty)
            .collect();
        if dirty.is_empty() {
            return Ok(());
        }

        for entry in &dirty {
            self.recman
                .lock()
                .update(entry.key, &entry.value, &entry.serializer)?;
            self.cache.mark_clean(entry.key);
        }
        debug!("flushed {} dirty cache entries", dirty.len());
        Ok(())
    }
}

impl<R: RecordManager> RecordManager for CacheRecordManager<R> {
    fn insert(&mut self, object: &Object, serializer: &SerializerRef) -> StorageResult<RecordId> {
        self.check_open()?;
        let id = self.recman.lock().reserve()?;
        if let Err(e) = self.cache.put(id, object.clone(), true, serializer.clone()) {
            if let Err(release) = self.recman.lock().delete(id) {
                warn!("failed to release reserved record {}: {}", id, release);
            }
            return Err(e.into());
        }
        Ok(id)
    }

    /// Caches the new value; the store sees it at eviction or commit. Unknown
    /// and deleted ids are rejected before anything is cached.
    fn update(
        &mut self,
        id: RecordId,
        object: &Object,
        serializer: &SerializerRef,
    ) -> StorageResult<()> {
        self.check_open()?;
        self.recman.lock().check_record(id)?;
        self.cache
            .put(id, object.clone(), true, serializer.clone())?;
        Ok(())
    }

    fn fetch(
        &mut self,
        id: RecordId,
        serializer: &SerializerRef,
    ) -> StorageResult<Option<Object>> {
        self.check_open()?;
        if let Some(object) = self.cache.get(id) {
            return Ok(Some(object));
        }

        let fetched = self.recman.lock().fetch(id, serializer)?;
        if let Some(object) = &fetched {
            self.cache
                .put(id, object.clone(), false, serializer.clone())?;
        }
        Ok(fetched)
    }

    fn delete(&mut self, id: RecordId) -> StorageResult<()> {
        self.check_open()?;
        self.cache.remove(id);
        self.recman.lock().delete(id)
    }

    fn check_record(&mut self, id: RecordId) -> StorageResult<()> {
        self.check_open()?;
        self.recman.lock().check_record(id)
    }

    fn reserve(&mut self) -> StorageResult<RecordId> {
        self.check_open()?;
        self.recman.lock().reserve()
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.check_open()?;
        self.flush()?;
        self.recman.lock().commit()
    }

    /// Discards the whole cache: it cannot tell which entries belong to the
    /// aborted transaction.
    fn rollback(&mut self) -> StorageResult<()> {
        self.check_open()?;
        self.recman.lock().rollback()?;
        self.cache.remove_all();
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.cache.remove_all();
        self.recman.lock().close()?;
        self.closed = true;
        Ok(())
    }

    fn root_count(&self) -> usize {
        self.recman.lock().root_count()
    }

    fn get_root(&mut self, index: usize) -> StorageResult<RecordId> {
        self.check_open()?;
        self.recman.lock().get_root(index)
    }

    fn set_root(&mut self, index: usize, id: RecordId) -> StorageResult<()> {
        self.check_open()?;
        self.recman.lock().set_root(index, id)
    }

    fn get_named_object(&mut self, name: &str) -> StorageResult<Option<RecordId>> {
        self.check_open()?;
        self.recman.lock().get_named_object(name)
    }

    fn set_named_object(&mut self, name: &str, id: RecordId) -> StorageResult<()> {
        self.check_open()?;
        self.recman.lock().set_named_object(name, id)
    }

    fn default_serializer(&self) -> SerializerRef {
        self.recman.lock().default_serializer()
    }
}

impl<R: RecordManager> Drop for CacheRecordManager<R> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!("failed to close cached record manager: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MruCache, SoftCache};
    use crate::config::StoreOptions;
    use crate::record::{BaseRecordManager, RecordManagerExt};
    use anyhow::Result;
    use tempfile::tempdir;

    fn open(path: &std::path::Path, capacity: usize) -> Result<CacheRecordManager<BaseRecordManager>> {
        let base = BaseRecordManager::open(path, &StoreOptions::default().with_sync_on_commit(false))?;
        Ok(CacheRecordManager::new(base, Arc::new(MruCache::new(capacity))))
    }

    #[test]
    fn test_insert_stays_in_cache_until_commit() -> Result<()> {
        let dir = tempdir()?;
        let mut recman = open(&dir.path().join("test.db"), 10)?;

        let id = recman.insert_bytes(b"pending")?;
        assert_eq!(recman.fetch_bytes(id)?.as_deref(), Some(&b"pending"[..]));
        // The store has only reserved the id
        assert_eq!(recman.with_inner(|inner| inner.fetch_bytes(id))?, None);

        recman.commit()?;
        assert_eq!(
            recman.with_inner(|inner| inner.fetch_bytes(id))?.as_deref(),
            Some(&b"pending"[..])
        );
        assert!(recman.cache().entries().iter().all(|entry| !entry.dirty));
        Ok(())
    }

    #[test]
    fn test_eviction_writes_back() -> Result<()> {
        let dir = tempdir()?;
        let mut recman = open(&dir.path().join("test.db"), 2)?;

        let first = recman.insert_bytes(b"first")?;
        recman.insert_bytes(b"second")?;
        recman.insert_bytes(b"third")?;

        // The oldest dirty entry was installed when it was evicted
        assert_eq!(
            recman.with_inner(|inner| inner.fetch_bytes(first))?.as_deref(),
            Some(&b"first"[..])
        );
        assert_eq!(recman.fetch_bytes(first)?.as_deref(), Some(&b"first"[..]));
        Ok(())
    }

    #[test]
    fn test_rollback_discards_cache() -> Result<()> {
        let dir = tempdir()?;
        let mut recman = open(&dir.path().join("test.db"), 10)?;

        let id = recman.insert_bytes(b"committed")?;
        recman.commit()?;

        recman.update_bytes(id, b"uncommitted")?;
        recman.rollback()?;

        assert!(recman.cache().is_empty());
        assert_eq!(recman.fetch_bytes(id)?.as_deref(), Some(&b"committed"[..]));
        Ok(())
    }

    #[test]
    fn test_delete_removes_cached_entry() -> Result<()> {
        let dir = tempdir()?;
        let mut recman = open(&dir.path().join("test.db"), 10)?;

        let id = recman.insert_bytes(b"doomed")?;
        recman.delete(id)?;
        assert_eq!(recman.fetch_bytes(id)?, None);
        recman.commit()?;
        assert_eq!(recman.fetch_bytes(id)?, None);
        Ok(())
    }

    #[test]
    fn test_close_flushes() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");

        let id = {
            let mut recman = open(&path, 10)?;
            let id = recman.insert_value(vec![1u32, 2, 3])?;
            recman.close()?;
            assert!(matches!(recman.fetch_bytes(id), Err(StorageError::Closed)));
            id
        };

        let mut recman = open(&path, 10)?;
        assert_eq!(recman.fetch_value::<Vec<u32>>(id)?, Some(vec![1, 2, 3]));
        Ok(())
    }

    #[test]
    fn test_update_rejects_unknown_and_deleted_ids() -> Result<()> {
        let dir = tempdir()?;
        let mut recman = open(&dir.path().join("test.db"), 2)?;

        let kept = recman.insert_bytes(b"kept")?;
        let gone = recman.insert_bytes(b"gone")?;
        recman.commit()?;
        recman.delete(gone)?;

        assert!(matches!(
            recman.update_bytes(RecordId(999_999_999), b"nowhere"),
            Err(StorageError::InvalidRecordId(_))
        ));
        assert!(matches!(
            recman.update_bytes(gone, b"again"),
            Err(StorageError::RecordNotFound(_))
        ));
        assert!(recman.cache().entries().iter().all(|entry| entry.key == kept));

        // Evictions keep writing back afterwards
        let more: Vec<RecordId> = (0..3u8)
            .map(|i| recman.insert_bytes(&[i; 8]))
            .collect::<StorageResult<_>>()?;
        recman.commit()?;
        assert_eq!(recman.fetch_bytes(kept)?.as_deref(), Some(&b"kept"[..]));
        for (i, id) in more.iter().enumerate() {
            assert_eq!(recman.fetch_bytes(*id)?, Some(vec![i as u8; 8]));
        }
        recman.close()?;
        Ok(())
    }

    /// Refuses the first eviction it hears about.
    struct RefuseOnce {
        armed: Mutex<bool>,
    }

    impl CachePolicyListener for RefuseOnce {
        fn cache_object_evicted(&self, entry: &CacheEntry) -> Result<(), CacheEvictionError> {
            let mut armed = self.armed.lock();
            if *armed {
                *armed = false;
                return Err(CacheEvictionError::new(entry.key, StorageError::Closed));
            }
            Ok(())
        }
    }

    #[test]
    fn test_refused_eviction_releases_reserved_id() -> Result<()> {
        let dir = tempdir()?;
        let mut recman = open(&dir.path().join("test.db"), 1)?;

        let first = recman.insert_bytes(b"first")?;
        recman.cache().add_listener(Arc::new(RefuseOnce {
            armed: Mutex::new(true),
        }));

        assert!(matches!(
            recman.insert_bytes(b"second"),
            Err(StorageError::CacheEviction(_))
        ));
        // The id reserved for the failed insert sits in the next translation slot
        let second = RecordId(first.0 + 10);
        assert!(matches!(
            recman.with_inner(|inner| inner.check_record(second)),
            Err(StorageError::RecordNotFound(_))
        ));
        assert_eq!(recman.cache().len(), 1);

        // The cache stays usable once the listener stops refusing
        let third = recman.insert_bytes(b"third")?;
        recman.commit()?;
        assert_eq!(recman.fetch_bytes(first)?.as_deref(), Some(&b"first"[..]));
        assert_eq!(recman.fetch_bytes(third)?.as_deref(), Some(&b"third"[..]));
        recman.close()?;
        Ok(())
    }

    #[test]
    fn test_refused_rollback_keeps_cache() -> Result<()> {
        let dir = tempdir()?;
        let base = BaseRecordManager::open(
            &dir.path().join("test.db"),
            &StoreOptions::default()
                .with_sync_on_commit(false)
                .with_transactions(false),
        )?;
        let mut recman = CacheRecordManager::new(base, Arc::new(MruCache::new(4)));

        let id = recman.insert_bytes(b"pending")?;
        assert!(matches!(
            recman.rollback(),
            Err(StorageError::TransactionsDisabled)
        ));
        assert_eq!(recman.cache().len(), 1);

        recman.commit()?;
        assert_eq!(
            recman.with_inner(|inner| inner.fetch_bytes(id))?.as_deref(),
            Some(&b"pending"[..])
        );
        Ok(())
    }

    #[test]
    fn test_soft_cache_stack() -> Result<()> {
        let dir = tempdir()?;
        let base = BaseRecordManager::open(
            &dir.path().join("test.db"),
            &StoreOptions::default().with_sync_on_commit(false),
        )?;
        let cache = Arc::new(SoftCache::new(MruCache::new(2), 8));
        let mut recman = CacheRecordManager::new(base, cache);

        let ids: Vec<RecordId> = (0..5u8)
            .map(|i| recman.insert_bytes(&[i; 16]))
            .collect::<StorageResult<_>>()?;
        recman.commit()?;

        for (i, id) in ids.iter().enumerate() {
            assert_eq!(recman.fetch_bytes(*id)?, Some(vec![i as u8; 16]));
            assert_eq!(
                recman.with_inner(|inner| inner.fetch_bytes(*id))?,
                Some(vec![i as u8; 16])
            );
        }
        Ok(())
    }
}
