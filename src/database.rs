use anyhow::{bail, Result};
use log::info;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{CacheRecordManager, MruCache, SoftCache};
use crate::config::{CacheOptions, StoreOptions};
use crate::record::{BaseRecordManager, RecordId, RecordManager, RecordManagerExt};

/// High-level store handle that assembles the record manager stack
/// described by [`StoreOptions`]. Clones share the same store; every
/// operation takes one lock.
#[derive(Clone)]
pub struct Database {
    recman: Arc<Mutex<Box<dyn RecordManager>>>,
    path: PathBuf,
}

impl Database {
    /// Create a new store at the specified path
    pub fn create(path: &Path) -> Result<Self> {
        Self::create_with_options(path, StoreOptions::default())
    }

    pub fn create_with_options(path: &Path, options: StoreOptions) -> Result<Self> {
        if path.exists() {
            bail!("Store file already exists at {:?}", path);
        }
        Self::assemble(path, options)
    }

    /// Open an existing store
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_options(path, StoreOptions::default())
    }

    pub fn open_with_options(path: &Path, options: StoreOptions) -> Result<Self> {
        if !path.exists() {
            bail!("Store file does not exist at {:?}", path);
        }
        Self::assemble(path, options)
    }

    fn assemble(path: &Path, options: StoreOptions) -> Result<Self> {
        let base = BaseRecordManager::open(path, &options)?;
        let recman: Box<dyn RecordManager> = match options.cache {
            CacheOptions::Disabled => Box::new(base),
            CacheOptions::Mru { capacity } => Box::new(CacheRecordManager::new(
                base,
                Arc::new(MruCache::new(capacity)),
            )),
            CacheOptions::Soft {
                capacity,
                reclaimable_capacity,
            } => Box::new(CacheRecordManager::new(
                base,
                Arc::new(SoftCache::new(MruCache::new(capacity), reclaimable_capacity)),
            )),
        };
        info!("assembled store at {:?} with cache {:?}", path, options.cache);

        Ok(Self {
            recman: Arc::new(Mutex::new(recman)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_bytes(&self, data: &[u8]) -> Result<RecordId> {
        Ok(self.recman.lock().insert_bytes(data)?)
    }

    pub fn update_bytes(&self, id: RecordId, data: &[u8]) -> Result<()> {
        Ok(self.recman.lock().update_bytes(id, data)?)
    }

    pub fn fetch_bytes(&self, id: RecordId) -> Result<Option<Vec<u8>>> {
        Ok(self.recman.lock().fetch_bytes(id)?)
    }

    pub fn insert_value<T>(&self, value: T) -> Result<RecordId>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Ok(self.recman.lock().insert_value(value)?)
    }

    pub fn update_value<T>(&self, id: RecordId, value: T) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Ok(self.recman.lock().update_value(id, value)?)
    }

    pub fn fetch_value<T>(&self, id: RecordId) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        Ok(self.recman.lock().fetch_value(id)?)
    }

    pub fn delete(&self, id: RecordId) -> Result<()> {
        Ok(self.recman.lock().delete(id)?)
    }

    pub fn commit(&self) -> Result<()> {
        Ok(self.recman.lock().commit()?)
    }

    pub fn rollback(&self) -> Result<()> {
        Ok(self.recman.lock().rollback()?)
    }

    /// Commit and close the store. Every handle sharing it is closed too.
    pub fn close(&self) -> Result<()> {
        Ok(self.recman.lock().close()?)
    }

    pub fn root_count(&self) -> usize {
        self.recman.lock().root_count()
    }

    pub fn get_root(&self, index: usize) -> Result<RecordId> {
        Ok(self.recman.lock().get_root(index)?)
    }

    pub fn set_root(&self, index: usize, id: RecordId) -> Result<()> {
        Ok(self.recman.lock().set_root(index, id)?)
    }

    pub fn get_named_object(&self, name: &str) -> Result<Option<RecordId>> {
        Ok(self.recman.lock().get_named_object(name)?)
    }

    pub fn set_named_object(&self, name: &str, id: RecordId) -> Result<()> {
        Ok(self.recman.lock().set_named_object(name, id)?)
    }

    /// Run `f` with exclusive access to the assembled record manager.
    pub fn with_record_manager<T>(&self, f: impl FnOnce(&mut dyn RecordManager) -> T) -> T {
        let mut recman = self.recman.lock();
        f(recman.as_mut())
    }
}
