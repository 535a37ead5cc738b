//! Transaction records appended to the log.
//!
//! A committed transaction is logged as the full after-image of every block
//! it dirtied. Replaying a transaction is therefore idempotent: writing the
//! images again produces the same data file.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::block::{BlockId, BLOCK_SIZE};
use crate::storage::error::{StorageError, StorageResult};

/// Sequence number assigned to each logged transaction, in commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct TxnSequence(pub u64);

impl TxnSequence {
    pub fn next(&self) -> Self {
        TxnSequence(self.0 + 1)
    }
}

impl fmt::Display for TxnSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TXN({})", self.0)
    }
}

/// After-image of one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedBlock {
    /// Block the image belongs to.
    pub block_id: u64,
    /// Full block contents, exactly `BLOCK_SIZE` bytes.
    pub data: Vec<u8>,
}

impl LoggedBlock {
    pub fn id(&self) -> BlockId {
        BlockId(self.block_id)
    }

    /// The image as a block-sized array, validating its length.
    pub fn image(&self) -> StorageResult<&[u8; BLOCK_SIZE]> {
        self.data.as_slice().try_into().map_err(|_| {
            StorageError::Corrupted(format!(
                "logged image for block {} has {} bytes",
                self.block_id,
                self.data.len()
            ))
        })
    }
}

/// One committed transaction: the ordered set of blocks it dirtied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogTransaction {
    /// Commit order of this transaction within the current log.
    pub sequence: TxnSequence,
    /// Block images sorted by block id.
    pub blocks: Vec<LoggedBlock>,
}

impl LogTransaction {
    pub fn new(sequence: TxnSequence) -> Self {
        LogTransaction {
            sequence,
            blocks: Vec::new(),
        }
    }

    /// Adds the after-image of `id`.
    pub fn push(&mut self, id: BlockId, data: &[u8; BLOCK_SIZE]) {
        self.blocks.push(LoggedBlock {
            block_id: id.0,
            data: data.to_vec(),
        });
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn serialize(&self) -> StorageResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> StorageResult<Self> {
        bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}
