//! In-memory image of one fixed-size block of the data file.

use byteorder::{BigEndian, ByteOrder};
use std::fmt;

/// Size in bytes of every block in the data file.
pub const BLOCK_SIZE: usize = 8192;

/// Raw block contents.
pub type BlockData = Box<[u8; BLOCK_SIZE]>;

/// 0-based block number within the data file. Block 0 is the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockId(pub u64);

impl BlockId {
    /// The file header block, also used as the "no block" sentinel in page links.
    pub const HEADER: BlockId = BlockId(0);

    pub fn is_header(&self) -> bool {
        self.0 == 0
    }

    /// Byte offset of this block in the data file.
    pub fn file_offset(&self) -> u64 {
        self.0 * BLOCK_SIZE as u64
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A block checked out of the block file.
///
/// Every write through the accessors marks the block dirty, so releasing it
/// routes the block to the dirty set without the caller tracking changes.
pub struct Block {
    id: BlockId,
    data: BlockData,
    dirty: bool,
}

impl Block {
    pub(crate) fn new(id: BlockId, data: BlockData) -> Self {
        Self {
            id,
            data,
            dirty: false,
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn data(&self) -> &[u8; BLOCK_SIZE] {
        &self.data
    }

    /// Mutable access to the raw bytes. Marks the block dirty.
    pub fn data_mut(&mut self) -> &mut [u8; BLOCK_SIZE] {
        self.dirty = true;
        &mut self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_clean(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn into_data(self) -> BlockData {
        self.data
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        BigEndian::read_u16(&self.data[offset..offset + 2])
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) {
        BigEndian::write_u16(&mut self.data_mut()[offset..offset + 2], value);
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        BigEndian::read_u32(&self.data[offset..offset + 4])
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        BigEndian::write_u32(&mut self.data_mut()[offset..offset + 4], value);
    }

    pub fn read_u64(&self, offset: usize) -> u64 {
        BigEndian::read_u64(&self.data[offset..offset + 8])
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) {
        BigEndian::write_u64(&mut self.data_mut()[offset..offset + 8], value);
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn fill(&mut self, offset: usize, len: usize, value: u8) {
        self.data_mut()[offset..offset + len].fill(value);
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Allocates a zeroed block buffer.
pub(crate) fn zeroed_data() -> BlockData {
    Box::new([0u8; BLOCK_SIZE])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_mark_dirty() {
        let mut block = Block::new(BlockId(3), zeroed_data());
        assert!(!block.is_dirty());

        let _ = block.read_u64(0);
        assert!(!block.is_dirty());

        block.write_u16(0, 0x1350);
        assert!(block.is_dirty());
        assert_eq!(block.read_u16(0), 0x1350);
    }

    #[test]
    fn test_big_endian_layout() {
        let mut block = Block::new(BlockId(1), zeroed_data());
        block.write_u32(10, 0x0102_0304);
        assert_eq!(block.read_bytes(10, 4), &[1, 2, 3, 4]);

        block.write_u64(100, u64::MAX - 1);
        assert_eq!(block.read_u64(100), u64::MAX - 1);
    }

    #[test]
    fn test_write_bytes_and_fill() {
        let mut block = Block::new(BlockId(1), zeroed_data());
        block.write_bytes(BLOCK_SIZE - 3, b"xyz");
        assert_eq!(block.read_bytes(BLOCK_SIZE - 3, 3), b"xyz");

        block.fill(BLOCK_SIZE - 3, 3, 0);
        assert_eq!(block.read_bytes(BLOCK_SIZE - 3, 3), &[0, 0, 0]);
    }

    #[test]
    fn test_file_offset() {
        assert_eq!(BlockId(0).file_offset(), 0);
        assert_eq!(BlockId(2).file_offset(), 2 * BLOCK_SIZE as u64);
        assert!(BlockId::HEADER.is_header());
    }
}
