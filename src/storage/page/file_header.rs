use crate::storage::block::{Block, BlockId, BLOCK_SIZE};
use crate::storage::page::PageType;

/// Magic number of block 0.
pub const FILE_MAGIC: u16 = 0x1340;

const O_MAGIC: usize = 0;
const O_BLOCK_COUNT: usize = 2;
const O_LISTS: usize = 10;
const LIST_ANCHOR_SIZE: usize = 16;
const O_ROOTS: usize = O_LISTS + PageType::ALL.len() * LIST_ANCHOR_SIZE;

/// Number of root slots in the file header.
pub const NROOTS: usize = (BLOCK_SIZE - O_ROOTS) / 8;

/// View of block 0: list anchors for each page type plus the root slots.
pub struct FileHeader<'a> {
    block: &'a mut Block,
}

impl<'a> FileHeader<'a> {
    pub fn new(block: &'a mut Block) -> Self {
        Self { block }
    }

    /// Formats a fresh header. Block 0 itself counts as allocated.
    pub fn init(&mut self) {
        self.block.fill(0, BLOCK_SIZE, 0);
        self.block.write_u16(O_MAGIC, FILE_MAGIC);
        self.set_block_count(1);
    }

    pub fn is_valid(&self) -> bool {
        self.block.read_u16(O_MAGIC) == FILE_MAGIC
    }

    /// Id of the first block never handed out by the page manager.
    pub fn block_count(&self) -> u64 {
        self.block.read_u64(O_BLOCK_COUNT)
    }

    pub fn set_block_count(&mut self, count: u64) {
        self.block.write_u64(O_BLOCK_COUNT, count);
    }

    fn anchor(page_type: PageType) -> usize {
        O_LISTS + page_type.index() * LIST_ANCHOR_SIZE
    }

    pub fn first(&self, page_type: PageType) -> BlockId {
        BlockId(self.block.read_u64(Self::anchor(page_type)))
    }

    pub fn set_first(&mut self, page_type: PageType, id: BlockId) {
        self.block.write_u64(Self::anchor(page_type), id.0);
    }

    pub fn last(&self, page_type: PageType) -> BlockId {
        BlockId(self.block.read_u64(Self::anchor(page_type) + 8))
    }

    pub fn set_last(&mut self, page_type: PageType, id: BlockId) {
        self.block.write_u64(Self::anchor(page_type) + 8, id.0);
    }

    /// Root slot `index`; the caller checks it against [`NROOTS`].
    pub fn root(&self, index: usize) -> u64 {
        self.block.read_u64(O_ROOTS + index * 8)
    }

    pub fn set_root(&mut self, index: usize, value: u64) {
        self.block.write_u64(O_ROOTS + index * 8, value);
    }
}
