//! Read-only summaries of a store's page lists and roots.

use std::fmt;

use crate::record::{BaseRecordManager, RecordId, RecordManager};
use crate::storage::{BlockId, PageCursor, PageType, StorageResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageListSummary {
    pub page_type: PageType,
    pub pages: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSummary {
    pub block_count: u64,
    pub page_lists: Vec<PageListSummary>,
    /// Application roots that are set, by index.
    pub roots: Vec<(usize, RecordId)>,
    pub names: Vec<(String, RecordId)>,
}

impl StoreSummary {
    pub fn collect(recman: &mut BaseRecordManager) -> StorageResult<Self> {
        let pages = recman.pages()?;
        let block_count = pages.block_count()?;

        let mut page_lists = Vec::with_capacity(PageType::ALL.len());
        for page_type in PageType::ALL {
            page_lists.push(PageListSummary {
                page_type,
                pages: PageCursor::new(page_type).collect(pages)?,
            });
        }

        let mut roots = Vec::new();
        for index in 0..recman.root_count() {
            let id = recman.get_root(index)?;
            if !id.is_none() {
                roots.push((index, id));
            }
        }

        Ok(Self {
            block_count,
            page_lists,
            roots,
            names: recman.named_objects()?,
        })
    }

    pub fn page_count(&self, page_type: PageType) -> usize {
        self.page_lists
            .iter()
            .find(|list| list.page_type == page_type)
            .map_or(0, |list| list.pages.len())
    }
}

impl fmt::Display for StoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "blocks: {}", self.block_count)?;
        for list in &self.page_lists {
            writeln!(f, "  {:<18} {}", list.page_type.name(), list.pages.len())?;
        }
        writeln!(f, "roots: {}", self.roots.len())?;
        for (index, id) in &self.roots {
            writeln!(f, "  [{}] {}", index, id)?;
        }
        writeln!(f, "names: {}", self.names.len())?;
        for (name, id) in &self.names {
            writeln!(f, "  {} -> {}", name, id)?;
        }
        Ok(())
    }
}
