use crate::record::Location;
use crate::storage::block::{Block, BlockId, BLOCK_SIZE};
use crate::storage::page::header;

/// Offset of the first translation slot.
pub const O_SLOTS: usize = header::SIZE;

/// Bytes per slot: block u64 + offset u16.
pub const SLOT_SIZE: usize = 10;

/// Translation slots per page.
pub const SLOTS_PER_PAGE: usize = (BLOCK_SIZE - O_SLOTS) / SLOT_SIZE;

/// A page of logical-to-physical mappings. A logical id is the location of
/// its slot on one of these pages.
pub struct TranslationPage<'a> {
    block: &'a mut Block,
}

impl<'a> TranslationPage<'a> {
    pub fn new(block: &'a mut Block) -> Self {
        Self { block }
    }

    /// Offset of slot `index`.
    pub fn slot_offset(index: usize) -> u16 {
        (O_SLOTS + index * SLOT_SIZE) as u16
    }

    /// True when `offset` addresses the start of a slot.
    pub fn is_slot_offset(offset: u16) -> bool {
        let offset = offset as usize;
        offset >= O_SLOTS
            && offset < O_SLOTS + SLOTS_PER_PAGE * SLOT_SIZE
            && (offset - O_SLOTS) % SLOT_SIZE == 0
    }

    pub fn get(&self, offset: u16) -> Location {
        read_location(self.block, offset as usize)
    }

    pub fn set(&mut self, offset: u16, location: Location) {
        write_location(self.block, offset as usize, location);
    }
}

pub(crate) fn read_location(block: &Block, offset: usize) -> Location {
    Location::new(
        BlockId(block.read_u64(offset)),
        block.read_u16(offset + 8),
    )
}

pub(crate) fn write_location(block: &mut Block, offset: usize, location: Location) {
    block.write_u64(offset, location.block.0);
    block.write_u16(offset + 8, location.offset);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block::zeroed_data;

    #[test]
    fn test_slot_geometry() {
        assert_eq!(SLOTS_PER_PAGE, 817);
        assert!(TranslationPage::is_slot_offset(18));
        assert!(TranslationPage::is_slot_offset(28));
        assert!(!TranslationPage::is_slot_offset(19));
        assert!(!TranslationPage::is_slot_offset(0));
        assert!(!TranslationPage::is_slot_offset(
            TranslationPage::slot_offset(SLOTS_PER_PAGE)
        ));
        assert!(TranslationPage::is_slot_offset(TranslationPage::slot_offset(
            SLOTS_PER_PAGE - 1
        )));
    }

    #[test]
    fn test_get_and_set() {
        let mut block = Block::new(BlockId(6), zeroed_data());
        let mut page = TranslationPage::new(&mut block);
        let offset = TranslationPage::slot_offset(3);

        assert_eq!(page.get(offset), Location::NONE);
        let location = Location::new(BlockId(12), 300);
        page.set(offset, location);
        assert_eq!(page.get(offset), location);
    }
}
