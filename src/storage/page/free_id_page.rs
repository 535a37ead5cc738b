//! Pages holding recyclable logical ids and physical rows.
//!
//! Both formats keep a count of occupied slots at offset 18 and a fixed array
//! of slots after it. A slot is free when its location is none.

use crate::record::Location;
use crate::storage::block::{Block, BLOCK_SIZE};
use crate::storage::page::header;
use crate::storage::page::translation_page::{read_location, write_location};

const O_COUNT: usize = header::SIZE;
const O_SLOTS: usize = O_COUNT + 2;

const LOGICAL_SLOT_SIZE: usize = 10;
const PHYSICAL_SLOT_SIZE: usize = 14;

pub const LOGICAL_SLOTS_PER_PAGE: usize = (BLOCK_SIZE - O_SLOTS) / LOGICAL_SLOT_SIZE;
pub const PHYSICAL_SLOTS_PER_PAGE: usize = (BLOCK_SIZE - O_SLOTS) / PHYSICAL_SLOT_SIZE;

fn count(block: &Block) -> usize {
    block.read_u16(O_COUNT) as usize
}

fn set_count(block: &mut Block, count: usize) {
    block.write_u16(O_COUNT, count as u16);
}

/// Free logical ids, one location per slot.
pub struct FreeLogicalIdPage<'a> {
    block: &'a mut Block,
}

impl<'a> FreeLogicalIdPage<'a> {
    pub fn new(block: &'a mut Block) -> Self {
        Self { block }
    }

    fn offset(slot: usize) -> usize {
        O_SLOTS + slot * LOGICAL_SLOT_SIZE
    }

    pub fn count(&self) -> usize {
        count(self.block)
    }

    pub fn is_full(&self) -> bool {
        self.count() >= LOGICAL_SLOTS_PER_PAGE
    }

    pub fn get(&self, slot: usize) -> Location {
        read_location(self.block, Self::offset(slot))
    }

    /// First occupied slot.
    pub fn first_allocated(&self) -> Option<usize> {
        (0..LOGICAL_SLOTS_PER_PAGE).find(|&slot| !self.get(slot).is_none())
    }

    /// First empty slot.
    pub fn first_free(&self) -> Option<usize> {
        (0..LOGICAL_SLOTS_PER_PAGE).find(|&slot| self.get(slot).is_none())
    }

    pub fn put(&mut self, slot: usize, location: Location) {
        let count = self.count();
        write_location(self.block, Self::offset(slot), location);
        set_count(self.block, count + 1);
    }

    pub fn take(&mut self, slot: usize) -> Location {
        let location = self.get(slot);
        let count = self.count();
        write_location(self.block, Self::offset(slot), Location::NONE);
        set_count(self.block, count.saturating_sub(1));
        location
    }
}

/// Free physical rows: location plus the capacity the row keeps.
pub struct FreePhysicalIdPage<'a> {
    block: &'a mut Block,
}

impl<'a> FreePhysicalIdPage<'a> {
    pub fn new(block: &'a mut Block) -> Self {
        Self { block }
    }

    fn offset(slot: usize) -> usize {
        O_SLOTS + slot * PHYSICAL_SLOT_SIZE
    }

    pub fn count(&self) -> usize {
        count(self.block)
    }

    pub fn is_full(&self) -> bool {
        self.count() >= PHYSICAL_SLOTS_PER_PAGE
    }

    pub fn get(&self, slot: usize) -> Location {
        read_location(self.block, Self::offset(slot))
    }

    pub fn capacity(&self, slot: usize) -> u32 {
        self.block.read_u32(Self::offset(slot) + 10)
    }

    pub fn first_free(&self) -> Option<usize> {
        (0..PHYSICAL_SLOTS_PER_PAGE).find(|&slot| self.get(slot).is_none())
    }

    /// Occupied slots with their capacities.
    pub fn entries(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        (0..PHYSICAL_SLOTS_PER_PAGE)
            .filter(move |&slot| !self.get(slot).is_none())
            .map(move |slot| (slot, self.capacity(slot)))
    }

    pub fn put(&mut self, slot: usize, location: Location, capacity: u32) {
        let offset = Self::offset(slot);
        let count = self.count();
        write_location(self.block, offset, location);
        self.block.write_u32(offset + 10, capacity);
        set_count(self.block, count + 1);
    }

    pub fn take(&mut self, slot: usize) -> (Location, u32) {
        let location = self.get(slot);
        let capacity = self.capacity(slot);
        let offset = Self::offset(slot);
        let count = self.count();
        self.block.fill(offset, PHYSICAL_SLOT_SIZE, 0);
        set_count(self.block, count.saturating_sub(1));
        (location, capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block::{zeroed_data, BlockId};

    #[test]
    fn test_slot_counts() {
        assert_eq!(LOGICAL_SLOTS_PER_PAGE, 817);
        assert_eq!(PHYSICAL_SLOTS_PER_PAGE, 583);
    }

    #[test]
    fn test_logical_slots() {
        let mut block = Block::new(BlockId(3), zeroed_data());
        let mut page = FreeLogicalIdPage::new(&mut block);
        assert_eq!(page.first_allocated(), None);
        assert_eq!(page.first_free(), Some(0));

        page.put(0, Location::new(BlockId(2), 18));
        page.put(1, Location::new(BlockId(2), 28));
        assert_eq!(page.count(), 2);
        assert_eq!(page.first_free(), Some(2));

        assert_eq!(page.take(0), Location::new(BlockId(2), 18));
        assert_eq!(page.count(), 1);
        assert_eq!(page.first_allocated(), Some(1));
        assert_eq!(page.first_free(), Some(0));
    }

    #[test]
    fn test_physical_slots() {
        let mut block = Block::new(BlockId(3), zeroed_data());
        let mut page = FreePhysicalIdPage::new(&mut block);

        page.put(0, Location::new(BlockId(5), 22), 100);
        page.put(1, Location::new(BlockId(5), 130), 40);
        let entries: Vec<_> = page.entries().collect();
        assert_eq!(entries, vec![(0, 100), (1, 40)]);

        assert_eq!(page.take(1), (Location::new(BlockId(5), 130), 40));
        assert_eq!(page.count(), 1);
        assert_eq!(page.entries().count(), 1);
        assert!(!page.is_full());
    }
}
