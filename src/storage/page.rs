//! On-disk page formats.
//!
//! Every block other than the file header starts with a [`PageHeader`] that
//! tags its type and links it into the doubly-linked list for that type. The
//! views in the submodules borrow a checked-out [`Block`](crate::storage::Block)
//! and read or write its fields in place.

pub mod data_page;
pub mod file_header;
pub mod free_id_page;
pub mod header;
pub mod translation_page;

use std::fmt;

use crate::storage::block::BLOCK_SIZE;

pub use data_page::DataPage;
pub use file_header::FileHeader;
pub use free_id_page::{FreeLogicalIdPage, FreePhysicalIdPage};
pub use header::PageHeader;
pub use translation_page::TranslationPage;

/// Usable bytes of a data page after its headers.
pub const DATA_PER_PAGE: usize = BLOCK_SIZE - data_page::O_DATA;

/// The list a page currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PageType {
    Free = 0,
    Used = 1,
    Translation = 2,
    FreeLogicalIds = 3,
    FreePhysicalIds = 4,
}

impl PageType {
    pub const ALL: [PageType; 5] = [
        PageType::Free,
        PageType::Used,
        PageType::Translation,
        PageType::FreeLogicalIds,
        PageType::FreePhysicalIds,
    ];

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(PageType::Free),
            1 => Some(PageType::Used),
            2 => Some(PageType::Translation),
            3 => Some(PageType::FreeLogicalIds),
            4 => Some(PageType::FreePhysicalIds),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            PageType::Free => "free",
            PageType::Used => "used",
            PageType::Translation => "translation",
            PageType::FreeLogicalIds => "free logical ids",
            PageType::FreePhysicalIds => "free physical ids",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_type_round_trip() {
        for page_type in PageType::ALL {
            assert_eq!(PageType::from_u16(page_type as u16), Some(page_type));
        }
        assert_eq!(PageType::from_u16(5), None);
    }

    #[test]
    fn test_data_per_page() {
        assert_eq!(DATA_PER_PAGE, 8170);
    }
}
