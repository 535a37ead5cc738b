//! Storage layer for vibestore.
//!
//! The data file is an array of fixed-size (8KB) blocks. Key components:
//!
//! - **DataFile**: raw block reads and writes against the data file
//! - **TransactionLog**: append-only log of committed block images
//! - **BlockFile**: checked-out/dirty/clean block bookkeeping, commit, rollback and recovery
//! - **PageManager**: typed, doubly-linked page lists anchored in the file header
//!
//! Record layout within pages lives in [`crate::record`].

pub mod block;
pub mod block_file;
pub mod disk;
pub mod error;
pub mod page;
pub mod page_manager;
pub mod wal;

pub use block::{Block, BlockId, BLOCK_SIZE};
pub use block_file::BlockFile;
pub use error::{StorageError, StorageResult};
pub use page::{PageType, DATA_PER_PAGE};
pub use page_manager::{PageCursor, PageManager};
