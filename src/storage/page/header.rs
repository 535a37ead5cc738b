use crate::storage::block::{Block, BlockId};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageType;

/// Page magic numbers are this base plus the page type.
pub const PAGE_MAGIC: u16 = 0x1350;

const O_MAGIC: usize = 0;
const O_NEXT: usize = 2;
const O_PREV: usize = 10;

/// Size of the page header shared by every page type.
pub const SIZE: usize = 18;

/// Type tag and list links at the start of every page.
pub struct PageHeader<'a> {
    block: &'a mut Block,
}

impl<'a> PageHeader<'a> {
    pub fn new(block: &'a mut Block) -> Self {
        Self { block }
    }

    /// Tags the page as `page_type` and clears its links.
    pub fn init(&mut self, page_type: PageType) {
        self.set_type(page_type);
        self.set_next(BlockId::HEADER);
        self.set_prev(BlockId::HEADER);
    }

    pub fn page_type(&self) -> StorageResult<PageType> {
        let magic = self.block.read_u16(O_MAGIC);
        magic
            .checked_sub(PAGE_MAGIC)
            .and_then(PageType::from_u16)
            .ok_or_else(|| {
                StorageError::Corrupted(format!(
                    "block {} has bad page magic {:#06x}",
                    self.block.id(),
                    magic
                ))
            })
    }

    pub fn set_type(&mut self, page_type: PageType) {
        self.block.write_u16(O_MAGIC, PAGE_MAGIC + page_type as u16);
    }

    /// Next page in this page's list, or the header block at the end of the list.
    pub fn next(&self) -> BlockId {
        BlockId(self.block.read_u64(O_NEXT))
    }

    pub fn set_next(&mut self, next: BlockId) {
        self.block.write_u64(O_NEXT, next.0);
    }

    pub fn prev(&self) -> BlockId {
        BlockId(self.block.read_u64(O_PREV))
    }

    pub fn set_prev(&mut self, prev: BlockId) {
        self.block.write_u64(O_PREV, prev.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block::zeroed_data;

    #[test]
    fn test_init_and_links() -> StorageResult<()> {
        let mut block = Block::new(BlockId(4), zeroed_data());
        let mut header = PageHeader::new(&mut block);
        header.init(PageType::Translation);
        header.set_next(BlockId(9));
        header.set_prev(BlockId(2));

        assert_eq!(header.page_type()?, PageType::Translation);
        assert_eq!(header.next(), BlockId(9));
        assert_eq!(header.prev(), BlockId(2));
        assert_eq!(block.read_u16(0), 0x1352);
        Ok(())
    }

    #[test]
    fn test_bad_magic() {
        let mut block = Block::new(BlockId(4), zeroed_data());
        assert!(matches!(
            PageHeader::new(&mut block).page_type(),
            Err(StorageError::Corrupted(_))
        ));
    }
}
