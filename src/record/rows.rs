use std::path::Path;

use crate::config::StoreOptions;
use crate::record::logical::LogicalRowManager;
use crate::record::physical::PhysicalRowManager;
use crate::record::{Location, RecordId};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::PageManager;

/// The page manager together with the row managers that borrow it.
///
/// Holds the install, read and remove paths shared by the record manager and
/// the buffered installer.
pub struct RowStore {
    pages: PageManager,
}

impl RowStore {
    pub fn open(path: &Path, options: &StoreOptions) -> StorageResult<Self> {
        Ok(Self {
            pages: PageManager::open(path, options)?,
        })
    }

    pub fn pages(&mut self) -> &mut PageManager {
        &mut self.pages
    }

    pub fn physical(&mut self) -> PhysicalRowManager<'_> {
        PhysicalRowManager::new(&mut self.pages)
    }

    pub fn logical(&mut self) -> LogicalRowManager<'_> {
        LogicalRowManager::new(&mut self.pages)
    }

    /// Where `id` currently points.
    pub fn location(&mut self, id: RecordId) -> StorageResult<Location> {
        self.logical().fetch(id)
    }

    /// Like [`location`](Self::location) but fails for free or deleted ids.
    pub fn live_location(&mut self, id: RecordId) -> StorageResult<Location> {
        let location = self.location(id)?;
        if location.is_none() {
            return Err(StorageError::RecordNotFound(id));
        }
        Ok(location)
    }

    /// Stores `data` as a new record.
    pub fn allocate(&mut self, data: &[u8]) -> StorageResult<RecordId> {
        let location = self.physical().insert(data)?;
        self.logical().insert(location)
    }

    /// Allocates an id with no bytes on disk yet.
    pub fn reserve(&mut self) -> StorageResult<RecordId> {
        self.logical().insert(Location::RESERVED)
    }

    /// Writes `data` for `id`, in place when its row has room, repointing the
    /// id if the row moved.
    pub fn install(&mut self, id: RecordId, data: &[u8]) -> StorageResult<()> {
        let location = self.live_location(id)?;
        let installed = if location.has_row() {
            self.physical().update(location, data)?
        } else {
            self.physical().insert(data)?
        };
        if installed != location {
            self.logical().update(id, installed)?;
        }
        Ok(())
    }

    /// Record bytes, or `None` for ids that are unknown, deleted or reserved.
    pub fn read(&mut self, id: RecordId) -> StorageResult<Option<Vec<u8>>> {
        let location = match self.location(id) {
            Ok(location) => location,
            Err(StorageError::InvalidRecordId(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if !location.has_row() {
            return Ok(None);
        }
        self.physical().fetch(location)
    }

    /// Deletes the row behind `id` and recycles the id.
    pub fn remove(&mut self, id: RecordId) -> StorageResult<()> {
        let location = self.live_location(id)?;
        if location.has_row() {
            self.physical().delete(location)?;
        }
        self.logical().delete(id)
    }

    pub fn commit(&mut self) -> StorageResult<()> {
        self.pages.commit()
    }

    /// False when blocks are written straight to the data file.
    pub fn is_transactional(&mut self) -> bool {
        self.pages.file().is_transactional()
    }

    pub fn rollback(&mut self) -> StorageResult<()> {
        self.pages.rollback()
    }

    pub fn close(&mut self) -> StorageResult<()> {
        self.pages.close()
    }
}
