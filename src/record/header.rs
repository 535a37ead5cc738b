use crate::storage::block::Block;

/// Size of the header written in front of every physical row.
pub const SIZE: usize = 8;

const O_CURRENT: usize = 0;
const O_AVAILABLE: usize = 4;

/// Record header at a physical location: live size and reserved capacity.
/// A current size of 0 marks a deleted row.
pub struct RecordHeader<'a> {
    block: &'a mut Block,
    offset: usize,
}

impl<'a> RecordHeader<'a> {
    pub fn new(block: &'a mut Block, offset: usize) -> Self {
        Self { block, offset }
    }

    pub fn current_size(&self) -> u32 {
        self.block.read_u32(self.offset + O_CURRENT)
    }

    pub fn set_current_size(&mut self, size: u32) {
        self.block.write_u32(self.offset + O_CURRENT, size);
    }

    pub fn available_size(&self) -> u32 {
        self.block.read_u32(self.offset + O_AVAILABLE)
    }

    pub fn set_available_size(&mut self, size: u32) {
        self.block.write_u32(self.offset + O_AVAILABLE, size);
    }

    /// Reserved bytes not holding live data.
    pub fn waste(&self) -> u32 {
        self.available_size().saturating_sub(self.current_size())
    }
}
