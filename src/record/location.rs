use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::block::BlockId;

/// A (block, offset) pair. Used both for physical rows and for the
/// translation slots that serve as logical ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Location {
    pub block: BlockId,
    pub offset: u16,
}

impl Location {
    /// Unallocated or deleted.
    pub const NONE: Location = Location {
        block: BlockId::HEADER,
        offset: 0,
    };

    /// A logical id that is allocated but has no bytes on disk yet.
    pub const RESERVED: Location = Location {
        block: BlockId::HEADER,
        offset: 1,
    };

    pub fn new(block: BlockId, offset: u16) -> Self {
        Self { block, offset }
    }

    pub fn from_u64(value: u64) -> Self {
        Self {
            block: BlockId(value >> 16),
            offset: (value & 0xffff) as u16,
        }
    }

    pub fn to_u64(self) -> u64 {
        (self.block.0 << 16) | self.offset as u64
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    pub fn is_reserved(&self) -> bool {
        *self == Self::RESERVED
    }

    /// True when the location points at a physical row. Block 0 is the file
    /// header, so no row ever lives there.
    pub fn has_row(&self) -> bool {
        !self.block.is_header()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.offset)
    }
}

/// Stable identifier of a record: the packed location of its translation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    pub const NONE: RecordId = RecordId(0);

    pub fn location(self) -> Location {
        Location::from_u64(self.0)
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl From<Location> for RecordId {
    fn from(location: Location) -> Self {
        RecordId(location.to_u64())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packing() {
        let location = Location::new(BlockId(0x1234), 0x5678);
        assert_eq!(location.to_u64(), 0x1234_5678);
        assert_eq!(Location::from_u64(0x1234_5678), location);
        assert_eq!(RecordId::from(location).location(), location);
    }

    #[test]
    fn test_sentinels() {
        assert!(Location::NONE.is_none());
        assert!(!Location::NONE.has_row());
        assert!(Location::RESERVED.is_reserved());
        assert!(!Location::RESERVED.has_row());
        assert!(Location::new(BlockId(1), 22).has_row());
        assert_eq!(RecordId::from(Location::NONE), RecordId::NONE);
    }
}
