//! Typed page lists on top of the block file.
//!
//! Every page belongs to exactly one doubly-linked list, selected by its type
//! and anchored in the file header. Allocation pops the free list (or extends
//! the file) and appends the page to the tail of the requested list.

use log::{debug, info};
use std::path::Path;

use crate::config::StoreOptions;
use crate::storage::block::{Block, BlockId, BLOCK_SIZE};
use crate::storage::block_file::BlockFile;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::file_header::NROOTS;
use crate::storage::page::{FileHeader, PageHeader, PageType};

pub struct PageManager {
    file: BlockFile,
}

impl PageManager {
    /// Opens the store at `path`, formatting the file header if the file is new.
    pub fn open(path: &Path, options: &StoreOptions) -> StorageResult<Self> {
        let mut file = BlockFile::open(path, options)?;

        if file.is_new()? {
            file.with_block(BlockId::HEADER, |block| {
                FileHeader::new(block).init();
                Ok(())
            })?;
            file.commit()?;
            info!("formatted new store {:?}", path);
        } else {
            let valid =
                file.with_block(BlockId::HEADER, |block| Ok(FileHeader::new(block).is_valid()))?;
            if !valid {
                return Err(StorageError::Corrupted(format!(
                    "{:?} is not a record store",
                    path
                )));
            }
        }

        Ok(Self { file })
    }

    pub fn file(&mut self) -> &mut BlockFile {
        &mut self.file
    }

    /// Checks out block `id` for the duration of `f`.
    pub fn with_block<T>(
        &mut self,
        id: BlockId,
        f: impl FnOnce(&mut Block) -> StorageResult<T>,
    ) -> StorageResult<T> {
        self.file.with_block(id, f)
    }

    fn with_header<T>(&mut self, f: impl FnOnce(&mut FileHeader) -> T) -> StorageResult<T> {
        self.file.with_block(BlockId::HEADER, |block| {
            let mut header = FileHeader::new(block);
            Ok(f(&mut header))
        })
    }

    /// Takes a page off the free list, or a new block at the end of the file,
    /// and appends it to the `page_type` list with a zeroed body.
    pub fn allocate(&mut self, page_type: PageType) -> StorageResult<BlockId> {
        let reused = self.first(PageType::Free)?;
        let id = if reused.is_header() {
            self.with_header(|header| {
                let id = BlockId(header.block_count());
                header.set_block_count(id.0 + 1);
                id
            })?
        } else {
            self.unlink(PageType::Free, reused)?;
            reused
        };

        self.with_block(id, |block| {
            block.fill(0, BLOCK_SIZE, 0);
            PageHeader::new(block).init(page_type);
            Ok(())
        })?;
        self.link_tail(page_type, id)?;

        debug!("allocated {} page {}", page_type, id);
        Ok(id)
    }

    /// Moves page `id` from the `page_type` list to the free list.
    pub fn free(&mut self, page_type: PageType, id: BlockId) -> StorageResult<()> {
        if id.is_header() {
            return Err(StorageError::Corrupted(
                "attempt to free the file header".to_string(),
            ));
        }
        let actual = self.page_type(id)?;
        if actual != page_type {
            return Err(StorageError::Corrupted(format!(
                "page {} is on the {} list, not {}",
                id, actual, page_type
            )));
        }

        self.unlink(page_type, id)?;
        self.with_block(id, |block| {
            PageHeader::new(block).set_type(PageType::Free);
            Ok(())
        })?;
        self.link_tail(PageType::Free, id)?;

        debug!("freed {} page {}", page_type, id);
        Ok(())
    }

    fn unlink(&mut self, page_type: PageType, id: BlockId) -> StorageResult<()> {
        let (prev, next) = self.with_block(id, |block| {
            let mut header = PageHeader::new(block);
            let links = (header.prev(), header.next());
            header.set_prev(BlockId::HEADER);
            header.set_next(BlockId::HEADER);
            Ok(links)
        })?;

        if prev.is_header() {
            self.with_header(|header| header.set_first(page_type, next))?;
        } else {
            self.with_block(prev, |block| {
                PageHeader::new(block).set_next(next);
                Ok(())
            })?;
        }

        if next.is_header() {
            self.with_header(|header| header.set_last(page_type, prev))?;
        } else {
            self.with_block(next, |block| {
                PageHeader::new(block).set_prev(prev);
                Ok(())
            })?;
        }
        Ok(())
    }

    fn link_tail(&mut self, page_type: PageType, id: BlockId) -> StorageResult<()> {
        let last = self.last(page_type)?;
        self.with_block(id, |block| {
            let mut header = PageHeader::new(block);
            header.set_prev(last);
            header.set_next(BlockId::HEADER);
            Ok(())
        })?;

        if last.is_header() {
            self.with_header(|header| header.set_first(page_type, id))?;
        } else {
            self.with_block(last, |block| {
                PageHeader::new(block).set_next(id);
                Ok(())
            })?;
        }
        self.with_header(|header| header.set_last(page_type, id))
    }

    /// Head of the `page_type` list, or the header block when it is empty.
    pub fn first(&mut self, page_type: PageType) -> StorageResult<BlockId> {
        self.with_header(|header| header.first(page_type))
    }

    pub fn last(&mut self, page_type: PageType) -> StorageResult<BlockId> {
        self.with_header(|header| header.last(page_type))
    }

    pub fn next(&mut self, id: BlockId) -> StorageResult<BlockId> {
        self.with_block(id, |block| Ok(PageHeader::new(block).next()))
    }

    pub fn prev(&mut self, id: BlockId) -> StorageResult<BlockId> {
        self.with_block(id, |block| Ok(PageHeader::new(block).prev()))
    }

    pub fn page_type(&mut self, id: BlockId) -> StorageResult<PageType> {
        self.with_block(id, |block| PageHeader::new(block).page_type())
    }

    /// Number of blocks handed out so far, the header included.
    pub fn block_count(&mut self) -> StorageResult<u64> {
        self.with_header(|header| header.block_count())
    }

    pub fn root(&mut self, index: usize) -> StorageResult<u64> {
        Self::check_root(index)?;
        self.with_header(|header| header.root(index))
    }

    pub fn set_root(&mut self, index: usize, value: u64) -> StorageResult<()> {
        Self::check_root(index)?;
        self.with_header(|header| header.set_root(index, value))
    }

    fn check_root(index: usize) -> StorageResult<()> {
        if index < NROOTS {
            Ok(())
        } else {
            Err(StorageError::InvalidRoot {
                index,
                max: NROOTS,
            })
        }
    }

    pub fn commit(&mut self) -> StorageResult<()> {
        self.file.commit()
    }

    pub fn rollback(&mut self) -> StorageResult<()> {
        self.file.rollback()
    }

    pub fn close(&mut self) -> StorageResult<()> {
        self.file.close()
    }
}

/// Walks one page list from head to tail without modifying it.
pub struct PageCursor {
    page_type: PageType,
    current: BlockId,
    started: bool,
}

impl PageCursor {
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            current: BlockId::HEADER,
            started: false,
        }
    }

    pub fn next(&mut self, pages: &mut PageManager) -> StorageResult<Option<BlockId>> {
        let next = if self.started {
            if self.current.is_header() {
                return Ok(None);
            }
            pages.next(self.current)?
        } else {
            self.started = true;
            pages.first(self.page_type)?
        };

        self.current = next;
        Ok((!next.is_header()).then_some(next))
    }

    /// Collects the remaining pages of the list.
    pub fn collect(mut self, pages: &mut PageManager) -> StorageResult<Vec<BlockId>> {
        let mut ids = Vec::new();
        while let Some(id) = self.next(pages)? {
            ids.push(id);
        }
        Ok(ids)
    }
}
