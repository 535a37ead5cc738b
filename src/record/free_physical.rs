use log::trace;

use crate::record::Location;
use crate::storage::error::StorageResult;
use crate::storage::page::FreePhysicalIdPage;
use crate::storage::{BlockId, PageCursor, PageManager, PageType};

/// Deleted physical rows available for reuse, with the capacity each keeps.
pub struct FreePhysicalRowIds<'a> {
    pages: &'a mut PageManager,
}

impl<'a> FreePhysicalRowIds<'a> {
    pub fn new(pages: &'a mut PageManager) -> Self {
        Self { pages }
    }

    /// Takes the smallest free row with at least `size` bytes of capacity.
    /// An exact fit ends the search early.
    pub fn get(&mut self, size: u32) -> StorageResult<Option<(Location, u32)>> {
        let mut best: Option<(BlockId, usize, u32)> = None;

        let mut cursor = PageCursor::new(PageType::FreePhysicalIds);
        while let Some(id) = cursor.next(self.pages)? {
            let candidate = self.pages.with_block(id, |block| {
                let page = FreePhysicalIdPage::new(block);
                let fit = page
                    .entries()
                    .filter(|&(_, capacity)| capacity >= size)
                    .min_by_key(|&(_, capacity)| capacity);
                Ok(fit)
            })?;

            if let Some((slot, capacity)) = candidate {
                if best.map_or(true, |(_, _, current)| capacity < current) {
                    best = Some((id, slot, capacity));
                }
                if capacity == size {
                    break;
                }
            }
        }

        let Some((id, slot, _)) = best else {
            return Ok(None);
        };

        let (taken, remaining) = self.pages.with_block(id, |block| {
            let mut page = FreePhysicalIdPage::new(block);
            let taken = page.take(slot);
            Ok((taken, page.count()))
        })?;
        if remaining == 0 {
            self.pages.free(PageType::FreePhysicalIds, id)?;
        }

        trace!("reused physical row {} (capacity {})", taken.0, taken.1);
        Ok(Some(taken))
    }

    /// Records a deleted row and its capacity. Only the last page of the list
    /// is tried before a new page is allocated.
    pub fn put(&mut self, location: Location, capacity: u32) -> StorageResult<()> {
        let last = self.pages.last(PageType::FreePhysicalIds)?;
        if !last.is_header() {
            let stored = self.pages.with_block(last, |block| {
                let mut page = FreePhysicalIdPage::new(block);
                match page.first_free() {
                    Some(slot) if !page.is_full() => {
                        page.put(slot, location, capacity);
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })?;
            if stored {
                return Ok(());
            }
        }

        let id = self.pages.allocate(PageType::FreePhysicalIds)?;
        self.pages.with_block(id, |block| {
            FreePhysicalIdPage::new(block).put(0, location, capacity);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::storage::page::free_id_page::PHYSICAL_SLOTS_PER_PAGE;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_best_fit() -> Result<()> {
        let dir = tempdir()?;
        let mut pages = PageManager::open(&dir.path().join("test.db"), &StoreOptions::default())?;
        let mut free = FreePhysicalRowIds::new(&mut pages);

        free.put(Location::new(BlockId(2), 22), 500)?;
        free.put(Location::new(BlockId(2), 600), 120)?;
        free.put(Location::new(BlockId(3), 22), 200)?;

        assert_eq!(free.get(1000)?, None);
        assert_eq!(free.get(150)?, Some((Location::new(BlockId(3), 22), 200)));
        assert_eq!(free.get(120)?, Some((Location::new(BlockId(2), 600), 120)));
        assert_eq!(free.get(1)?, Some((Location::new(BlockId(2), 22), 500)));
        assert_eq!(free.get(1)?, None);
        Ok(())
    }

    #[test]
    fn test_put_appends_to_last_page() -> Result<()> {
        let dir = tempdir()?;
        let mut pages = PageManager::open(&dir.path().join("test.db"), &StoreOptions::default())?;
        let mut free = FreePhysicalRowIds::new(&mut pages);

        for i in 0..=PHYSICAL_SLOTS_PER_PAGE as u64 {
            free.put(Location::new(BlockId(100 + i), 22), 64)?;
        }
        // Opens a hole in the first page
        assert_eq!(free.get(64)?, Some((Location::new(BlockId(100), 22), 64)));
        free.put(Location::new(BlockId(5000), 22), 64)?;

        let lists = PageCursor::new(PageType::FreePhysicalIds).collect(&mut pages)?;
        assert_eq!(lists.len(), 2);
        let counts = lists
            .iter()
            .map(|&id| pages.with_block(id, |block| Ok(FreePhysicalIdPage::new(block).count())))
            .collect::<StorageResult<Vec<_>>>()?;
        assert_eq!(counts, vec![PHYSICAL_SLOTS_PER_PAGE - 1, 2]);
        Ok(())
    }
}
