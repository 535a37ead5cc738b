use log::debug;

use crate::record::free_logical::FreeLogicalRowIds;
use crate::record::{Location, RecordId};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::translation_page::SLOTS_PER_PAGE;
use crate::storage::page::{PageHeader, TranslationPage};
use crate::storage::{PageManager, PageType};

/// Maps stable logical ids to physical locations through translation pages.
pub struct LogicalRowManager<'a> {
    pages: &'a mut PageManager,
}

impl<'a> LogicalRowManager<'a> {
    pub fn new(pages: &'a mut PageManager) -> Self {
        Self { pages }
    }

    /// Allocates a logical id mapped to `location`.
    pub fn insert(&mut self, location: Location) -> StorageResult<RecordId> {
        let slot = match FreeLogicalRowIds::new(self.pages).get()? {
            Some(slot) => slot,
            None => self.grow()?,
        };

        self.pages.with_block(slot.block, |block| {
            TranslationPage::new(block).set(slot.offset, location);
            Ok(())
        })?;
        Ok(RecordId::from(slot))
    }

    /// Adds a translation page, queues all of its slots as free and takes one.
    fn grow(&mut self) -> StorageResult<Location> {
        let id = self.pages.allocate(PageType::Translation)?;
        debug!("new translation page {} ({} slots)", id, SLOTS_PER_PAGE);

        let mut free = FreeLogicalRowIds::new(self.pages);
        for index in 0..SLOTS_PER_PAGE {
            free.put(Location::new(id, TranslationPage::slot_offset(index)))?;
        }
        free.get()?.ok_or_else(|| {
            StorageError::Corrupted(format!("translation page {} queued no free slots", id))
        })
    }

    /// Points `id` at `location`.
    pub fn update(&mut self, id: RecordId, location: Location) -> StorageResult<()> {
        let slot = self.validate(id)?;
        self.pages.with_block(slot.block, |block| {
            TranslationPage::new(block).set(slot.offset, location);
            Ok(())
        })
    }

    /// Current mapping of `id`; `Location::NONE` if it is free or deleted.
    pub fn fetch(&mut self, id: RecordId) -> StorageResult<Location> {
        let slot = self.validate(id)?;
        self.pages
            .with_block(slot.block, |block| Ok(TranslationPage::new(block).get(slot.offset)))
    }

    /// Clears the mapping and recycles `id`. The physical row is left alone.
    pub fn delete(&mut self, id: RecordId) -> StorageResult<()> {
        let slot = self.validate(id)?;
        self.pages.with_block(slot.block, |block| {
            TranslationPage::new(block).set(slot.offset, Location::NONE);
            Ok(())
        })?;
        FreeLogicalRowIds::new(self.pages).put(slot)
    }

    /// Checks that `id` addresses a slot on a translation page.
    pub fn validate(&mut self, id: RecordId) -> StorageResult<Location> {
        let slot = id.location();
        if slot.block.is_header()
            || slot.block.0 >= self.pages.block_count()?
            || !TranslationPage::is_slot_offset(slot.offset)
        {
            return Err(StorageError::InvalidRecordId(id));
        }

        let is_translation = self.pages.with_block(slot.block, |block| {
            Ok(matches!(
                PageHeader::new(block).page_type(),
                Ok(PageType::Translation)
            ))
        })?;
        if !is_translation {
            return Err(StorageError::InvalidRecordId(id));
        }
        Ok(slot)
    }
}
