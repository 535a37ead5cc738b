use crate::storage::block::{Block, BLOCK_SIZE};
use crate::storage::page::{header, PageHeader, PageType};

const O_FIRST: usize = header::SIZE;
const O_FREE: usize = O_FIRST + 2;

/// Offset of the first data byte of a data page.
pub const O_DATA: usize = O_FREE + 2;

/// A page on the used list holding record headers and record bytes.
///
/// `first` is the offset of the first record header that begins on this page
/// (0 when the page only carries the continuation of an earlier record);
/// `free` is the first unallocated offset, `BLOCK_SIZE` once the page is full.
pub struct DataPage<'a> {
    block: &'a mut Block,
}

impl<'a> DataPage<'a> {
    pub fn new(block: &'a mut Block) -> Self {
        Self { block }
    }

    /// Formats the block as an empty data page, keeping its list links.
    pub fn init(&mut self) {
        PageHeader::new(self.block).set_type(PageType::Used);
        self.set_first(0);
        self.set_free(O_DATA);
    }

    pub fn first(&self) -> u16 {
        self.block.read_u16(O_FIRST)
    }

    pub fn set_first(&mut self, offset: u16) {
        self.block.write_u16(O_FIRST, offset);
    }

    pub fn free(&self) -> usize {
        match self.block.read_u16(O_FREE) {
            0 => BLOCK_SIZE,
            offset => offset as usize,
        }
    }

    /// Stores the first unallocated offset. `BLOCK_SIZE` does not fit a u16 and
    /// is stored as 0.
    pub fn set_free(&mut self, offset: usize) {
        let stored = if offset >= BLOCK_SIZE { 0 } else { offset as u16 };
        self.block.write_u16(O_FREE, stored);
    }

    pub fn remaining(&self) -> usize {
        BLOCK_SIZE - self.free()
    }

    pub fn block(&mut self) -> &mut Block {
        self.block
    }
}
