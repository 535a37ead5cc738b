use log::trace;

use crate::record::Location;
use crate::storage::error::StorageResult;
use crate::storage::page::FreeLogicalIdPage;
use crate::storage::{PageCursor, PageManager, PageType};

/// Recycled logical ids, kept on the free-logical-id page list.
pub struct FreeLogicalRowIds<'a> {
    pages: &'a mut PageManager,
}

impl<'a> FreeLogicalRowIds<'a> {
    pub fn new(pages: &'a mut PageManager) -> Self {
        Self { pages }
    }

    /// Takes a free logical id, freeing its page once the page is empty.
    pub fn get(&mut self) -> StorageResult<Option<Location>> {
        let mut cursor = PageCursor::new(PageType::FreeLogicalIds);
        while let Some(id) = cursor.next(self.pages)? {
            let taken = self.pages.with_block(id, |block| {
                let mut page = FreeLogicalIdPage::new(block);
                Ok(page
                    .first_allocated()
                    .map(|slot| (page.take(slot), page.count())))
            })?;

            if let Some((location, remaining)) = taken {
                if remaining == 0 {
                    self.pages.free(PageType::FreeLogicalIds, id)?;
                }
                trace!("reused logical id {}", location);
                return Ok(Some(location));
            }
        }
        Ok(None)
    }

    /// Records `location` as free for reuse. Only the last page of the list is
    /// tried before a new page is allocated.
    pub fn put(&mut self, location: Location) -> StorageResult<()> {
        let last = self.pages.last(PageType::FreeLogicalIds)?;
        if !last.is_header() {
            let stored = self.pages.with_block(last, |block| {
                let mut page = FreeLogicalIdPage::new(block);
                match page.first_free() {
                    Some(slot) if !page.is_full() => {
                        page.put(slot, location);
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })?;
            if stored {
                return Ok(());
            }
        }

        let id = self.pages.allocate(PageType::FreeLogicalIds)?;
        self.pages.with_block(id, |block| {
            FreeLogicalIdPage::new(block).put(0, location);
            Ok(())
        })
    }
}
