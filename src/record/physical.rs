//! Variable-length rows on data pages.
//!
//! A row is a [`RecordHeader`] followed by its bytes. New rows are appended at
//! the free offset of the last page on the used list; a row longer than the
//! rest of that page continues from the data offset of the following pages.
//! Deleted rows keep their capacity and are recycled through
//! [`FreePhysicalRowIds`].

use log::trace;

use crate::record::free_physical::FreePhysicalRowIds;
use crate::record::header::{self, RecordHeader};
use crate::record::Location;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::data_page::O_DATA;
use crate::storage::page::DataPage;
use crate::storage::{BlockId, PageManager, PageType, BLOCK_SIZE, DATA_PER_PAGE};

/// Tail space smaller than this is folded into the preceding row's capacity.
pub const MIN_TAIL: usize = header::SIZE + 16;

pub struct PhysicalRowManager<'a> {
    pages: &'a mut PageManager,
}

impl<'a> PhysicalRowManager<'a> {
    pub fn new(pages: &'a mut PageManager) -> Self {
        Self { pages }
    }

    /// Stores `data` in a recycled row if one is large enough, otherwise in
    /// freshly allocated space.
    pub fn insert(&mut self, data: &[u8]) -> StorageResult<Location> {
        let size = record_size(data)?;

        if let Some((location, capacity)) = FreePhysicalRowIds::new(self.pages).get(size)? {
            self.write(location, data, capacity)?;
            return Ok(location);
        }

        let (location, capacity) = self.allocate(size)?;
        self.write(location, data, capacity)?;
        trace!("new row {} ({} of {} bytes)", location, size, capacity);
        Ok(location)
    }

    /// Rewrites the row at `location`, in place when it fits. Returns the row's
    /// location, which changes only when the row had to move.
    pub fn update(&mut self, location: Location, data: &[u8]) -> StorageResult<Location> {
        let size = record_size(data)?;
        let capacity = self.capacity(location)?;
        if size <= capacity {
            self.write(location, data, capacity)?;
            return Ok(location);
        }

        self.delete(location)?;
        self.insert(data)
    }

    /// Overwrites the row at `location`, which must have room for `data`.
    pub fn write_in_place(&mut self, location: Location, data: &[u8]) -> StorageResult<()> {
        let size = record_size(data)?;
        let capacity = self.capacity(location)?;
        if size > capacity {
            return Err(StorageError::RecordTooLarge {
                size: size as usize,
                max: capacity as usize,
            });
        }
        self.write(location, data, capacity)
    }

    /// Marks the row deleted and offers it, with its full capacity, for reuse.
    pub fn delete(&mut self, location: Location) -> StorageResult<()> {
        check_location(location)?;
        let capacity = self.pages.with_block(location.block, |block| {
            let mut header = RecordHeader::new(block, location.offset as usize);
            header.set_current_size(0);
            Ok(header.available_size())
        })?;
        FreePhysicalRowIds::new(self.pages).put(location, capacity)
    }

    /// Bytes of the row at `location`, or `None` if it was deleted.
    pub fn fetch(&mut self, location: Location) -> StorageResult<Option<Vec<u8>>> {
        check_location(location)?;
        let offset = location.offset as usize;
        let data_start = offset + header::SIZE;

        let first = self.pages.with_block(location.block, |block| {
            let size = RecordHeader::new(block, offset).current_size() as usize;
            if size == 0 {
                return Ok(None);
            }
            let take = size.min(BLOCK_SIZE - data_start);
            let mut data = Vec::with_capacity(size);
            data.extend_from_slice(block.read_bytes(data_start, take));
            Ok(Some((size, data)))
        })?;

        let Some((size, mut data)) = first else {
            return Ok(None);
        };

        let mut block_id = location.block;
        while data.len() < size {
            block_id = self.continuation(block_id)?;
            let take = (size - data.len()).min(DATA_PER_PAGE);
            self.pages.with_block(block_id, |block| {
                data.extend_from_slice(block.read_bytes(O_DATA, take));
                Ok(())
            })?;
        }
        Ok(Some(data))
    }

    /// Reserved size of the row at `location`.
    pub fn capacity(&mut self, location: Location) -> StorageResult<u32> {
        check_location(location)?;
        self.pages.with_block(location.block, |block| {
            Ok(RecordHeader::new(block, location.offset as usize).available_size())
        })
    }

    /// Writes every record onto one newly allocated page, back to back, and
    /// returns their locations in order.
    pub fn install_page(&mut self, records: &[&[u8]]) -> StorageResult<Vec<Location>> {
        let mut required = 0;
        for data in records {
            record_size(data)?;
            required += header::SIZE + data.len();
        }
        if required > DATA_PER_PAGE {
            return Err(StorageError::BucketOverflow {
                required,
                available: DATA_PER_PAGE,
            });
        }

        let id = self.pages.allocate(PageType::Used)?;
        self.pages.with_block(id, |block| {
            let mut locations = Vec::with_capacity(records.len());
            let mut position = O_DATA;

            for (i, data) in records.iter().enumerate() {
                let mut capacity = data.len();
                let mut end = position + header::SIZE + capacity;
                if i + 1 == records.len() && BLOCK_SIZE - end < MIN_TAIL {
                    capacity += BLOCK_SIZE - end;
                    end = BLOCK_SIZE;
                }

                let mut header = RecordHeader::new(block, position);
                header.set_current_size(data.len() as u32);
                header.set_available_size(capacity as u32);
                block.write_bytes(position + header::SIZE, data);

                locations.push(Location::new(id, position as u16));
                position = end;
            }

            let mut page = DataPage::new(block);
            page.init();
            if !records.is_empty() {
                page.set_first(O_DATA as u16);
            }
            page.set_free(position);
            Ok(locations)
        })
    }

    /// Reserves `size` bytes at the end of the used list, spilling onto new
    /// pages as needed. Returns the row location and its rounded capacity.
    fn allocate(&mut self, size: u32) -> StorageResult<(Location, u32)> {
        let tail = self.pages.last(PageType::Used)?;
        let position = if tail.is_header() {
            None
        } else {
            self.pages.with_block(tail, |block| {
                let free = DataPage::new(block).free();
                Ok((BLOCK_SIZE - free >= MIN_TAIL).then_some(free))
            })?
        };

        let (start, position) = match position {
            Some(position) => (tail, position),
            None => (self.new_data_page()?, O_DATA),
        };

        let mut capacity = size as usize;
        let data_start = position + header::SIZE;
        let on_first = BLOCK_SIZE - data_start;

        let first_end = if capacity <= on_first {
            let end = data_start + capacity;
            if BLOCK_SIZE - end < MIN_TAIL {
                capacity += BLOCK_SIZE - end;
                BLOCK_SIZE
            } else {
                end
            }
        } else {
            BLOCK_SIZE
        };

        self.pages.with_block(start, |block| {
            let mut page = DataPage::new(block);
            if page.first() == 0 {
                page.set_first(position as u16);
            }
            page.set_free(first_end);
            Ok(())
        })?;

        let mut spill = (size as usize).saturating_sub(on_first);
        while spill > 0 {
            let id = self.new_data_page()?;
            let end = if spill <= DATA_PER_PAGE {
                let end = O_DATA + spill;
                if BLOCK_SIZE - end < MIN_TAIL {
                    capacity += BLOCK_SIZE - end;
                    BLOCK_SIZE
                } else {
                    end
                }
            } else {
                BLOCK_SIZE
            };
            spill = spill.saturating_sub(DATA_PER_PAGE);

            self.pages.with_block(id, |block| {
                DataPage::new(block).set_free(end);
                Ok(())
            })?;
        }

        let capacity = u32::try_from(capacity).map_err(|_| StorageError::RecordTooLarge {
            size: capacity,
            max: u32::MAX as usize,
        })?;
        Ok((Location::new(start, position as u16), capacity))
    }

    fn new_data_page(&mut self) -> StorageResult<BlockId> {
        let id = self.pages.allocate(PageType::Used)?;
        self.pages.with_block(id, |block| {
            DataPage::new(block).init();
            Ok(())
        })?;
        Ok(id)
    }

    /// Writes the header and bytes of a row whose space is already reserved.
    fn write(&mut self, location: Location, data: &[u8], capacity: u32) -> StorageResult<()> {
        check_location(location)?;
        let offset = location.offset as usize;
        let data_start = offset + header::SIZE;
        let head = data.len().min(BLOCK_SIZE - data_start);

        self.pages.with_block(location.block, |block| {
            let mut header = RecordHeader::new(block, offset);
            header.set_current_size(data.len() as u32);
            header.set_available_size(capacity);
            block.write_bytes(data_start, &data[..head]);
            Ok(())
        })?;

        let mut rest = &data[head..];
        let mut block_id = location.block;
        while !rest.is_empty() {
            block_id = self.continuation(block_id)?;
            let take = rest.len().min(DATA_PER_PAGE);
            self.pages.with_block(block_id, |block| {
                block.write_bytes(O_DATA, &rest[..take]);
                Ok(())
            })?;
            rest = &rest[take..];
        }
        Ok(())
    }

    fn continuation(&mut self, id: BlockId) -> StorageResult<BlockId> {
        let next = self.pages.next(id)?;
        if next.is_header() {
            return Err(StorageError::Corrupted(format!(
                "row continues past the last data page {}",
                id
            )));
        }
        Ok(next)
    }
}

fn record_size(data: &[u8]) -> StorageResult<u32> {
    if data.is_empty() {
        return Err(StorageError::EmptyRecord);
    }
    u32::try_from(data.len()).map_err(|_| StorageError::RecordTooLarge {
        size: data.len(),
        max: u32::MAX as usize,
    })
}

fn check_location(location: Location) -> StorageResult<()> {
    let offset = location.offset as usize;
    if !location.has_row() || offset < O_DATA || offset + header::SIZE > BLOCK_SIZE {
        return Err(StorageError::Corrupted(format!(
            "{} is not a physical row location",
            location
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::storage::PageCursor;
    use anyhow::Result;
    use tempfile::tempdir;

    fn open(dir: &tempfile::TempDir) -> Result<PageManager> {
        Ok(PageManager::open(
            &dir.path().join("test.db"),
            &StoreOptions::default().with_sync_on_commit(false),
        )?)
    }

    #[test]
    fn test_insert_and_fetch() -> Result<()> {
        let dir = tempdir()?;
        let mut pages = open(&dir)?;
        let mut rows = PhysicalRowManager::new(&mut pages);

        let a = rows.insert(b"first row")?;
        let b = rows.insert(b"second row")?;
        assert_eq!(a, Location::new(BlockId(1), O_DATA as u16));
        assert_eq!(b.offset as usize, O_DATA + header::SIZE + 9);

        assert_eq!(rows.fetch(a)?.as_deref(), Some(&b"first row"[..]));
        assert_eq!(rows.fetch(b)?.as_deref(), Some(&b"second row"[..]));
        Ok(())
    }

    #[test]
    fn test_empty_record_rejected() -> Result<()> {
        let dir = tempdir()?;
        let mut pages = open(&dir)?;
        let mut rows = PhysicalRowManager::new(&mut pages);
        assert!(matches!(rows.insert(b""), Err(StorageError::EmptyRecord)));
        Ok(())
    }

    #[test]
    fn test_update_in_place_and_move() -> Result<()> {
        let dir = tempdir()?;
        let mut pages = open(&dir)?;
        let mut rows = PhysicalRowManager::new(&mut pages);

        let location = rows.insert(&[1u8; 100])?;
        let _neighbour = rows.insert(&[2u8; 10])?;

        assert_eq!(rows.update(location, &[3u8; 60])?, location);
        assert_eq!(rows.fetch(location)?, Some(vec![3u8; 60]));
        assert_eq!(rows.capacity(location)?, 100);

        let moved = rows.update(location, &[4u8; 200])?;
        assert_ne!(moved, location);
        assert_eq!(rows.fetch(moved)?, Some(vec![4u8; 200]));
        assert_eq!(rows.fetch(location)?, None);
        Ok(())
    }

    #[test]
    fn test_delete_recycles_capacity() -> Result<()> {
        let dir = tempdir()?;
        let mut pages = open(&dir)?;
        let mut rows = PhysicalRowManager::new(&mut pages);

        let location = rows.insert(&[1u8; 300])?;
        rows.insert(&[2u8; 10])?;
        rows.delete(location)?;
        assert_eq!(rows.fetch(location)?, None);

        // A smaller row reuses the slot and keeps its capacity
        let reused = rows.insert(&[5u8; 120])?;
        assert_eq!(reused, location);
        assert_eq!(rows.capacity(reused)?, 300);
        assert_eq!(rows.fetch(reused)?, Some(vec![5u8; 120]));
        Ok(())
    }

    #[test]
    fn test_tail_rounding() -> Result<()> {
        let dir = tempdir()?;
        let mut pages = open(&dir)?;
        let mut rows = PhysicalRowManager::new(&mut pages);

        // Leaves 10 bytes at the end of the page, which the row absorbs
        let size = DATA_PER_PAGE - header::SIZE - 10;
        let location = rows.insert(&vec![7u8; size])?;
        assert_eq!(rows.capacity(location)?, (size + 10) as u32);

        let next = rows.insert(b"next")?;
        assert_eq!(next.block, BlockId(2));
        assert_eq!(next.offset as usize, O_DATA);
        Ok(())
    }

    #[test]
    fn test_multi_page_row() -> Result<()> {
        let dir = tempdir()?;
        let mut pages = open(&dir)?;
        let mut rows = PhysicalRowManager::new(&mut pages);

        let small = rows.insert(b"small")?;
        let large: Vec<u8> = (0..3 * DATA_PER_PAGE).map(|i| (i % 251) as u8).collect();
        let location = rows.insert(&large)?;
        let after = rows.insert(b"after")?;

        assert_eq!(location.block, small.block);
        assert_eq!(rows.fetch(location)?, Some(large.clone()));
        assert_eq!(rows.fetch(after)?.as_deref(), Some(&b"after"[..]));
        assert_eq!(rows.fetch(small)?.as_deref(), Some(&b"small"[..]));

        // Rewriting in place follows the same span
        let mut changed = large.clone();
        changed[2 * DATA_PER_PAGE] = 0xff;
        assert_eq!(rows.update(location, &changed)?, location);
        assert_eq!(rows.fetch(location)?, Some(changed));

        assert_eq!(PageCursor::new(PageType::Used).collect(&mut pages)?.len(), 4);
        Ok(())
    }

    #[test]
    fn test_install_page() -> Result<()> {
        let dir = tempdir()?;
        let mut pages = open(&dir)?;
        let mut rows = PhysicalRowManager::new(&mut pages);
        rows.insert(b"existing")?;

        let records: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i; 100 + i as usize]).collect();
        let refs: Vec<&[u8]> = records.iter().map(|r| r.as_slice()).collect();
        let locations = rows.install_page(&refs)?;

        assert_eq!(locations.len(), 4);
        assert!(locations.iter().all(|l| l.block == BlockId(2)));
        assert_eq!(locations[0].offset as usize, O_DATA);
        for (location, record) in locations.iter().zip(&records) {
            assert_eq!(rows.fetch(*location)?.as_ref(), Some(record));
        }

        // Later appends continue on the installed page
        let appended = rows.insert(b"appended")?;
        assert_eq!(appended.block, BlockId(2));
        Ok(())
    }

    #[test]
    fn test_install_page_overflow() -> Result<()> {
        let dir = tempdir()?;
        let mut pages = open(&dir)?;
        let mut rows = PhysicalRowManager::new(&mut pages);

        let big = vec![1u8; DATA_PER_PAGE];
        assert!(matches!(
            rows.install_page(&[&big]),
            Err(StorageError::BucketOverflow { .. })
        ));
        Ok(())
    }
}
