//! Storage layer error types.

use thiserror::Error;

use crate::cache::CacheEvictionError;
use crate::record::RecordId;
use crate::storage::block::BlockId;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Block {0} is already in use")]
    BlockInUse(BlockId),

    #[error("Block {0} was released but is not in use")]
    BlockNotInUse(BlockId),

    #[error("{count} block(s) still in use at {operation}")]
    BlocksInUse { count: usize, operation: &'static str },

    #[error("Rollback is not possible with transactions disabled")]
    TransactionsDisabled,

    #[error("Store is corrupted: {0}")]
    Corrupted(String),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Invalid record id: {0}")]
    InvalidRecordId(RecordId),

    #[error("Zero-length records cannot be stored")]
    EmptyRecord,

    #[error("Bucket overflow: requires {required} bytes but only {available} available")]
    BucketOverflow { required: usize, available: usize },

    #[error("Record of {size} bytes exceeds the maximum of {max}")]
    RecordTooLarge { size: usize, max: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Type mismatch: expected {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("Serializer mismatch: store was created with '{stored}', opened with '{configured}'")]
    SerializerMismatch { stored: String, configured: String },

    #[error("Invalid root slot {index} (max: {max})")]
    InvalidRoot { index: usize, max: usize },

    #[error("Record manager is closed")]
    Closed,

    #[error(transparent)]
    CacheEviction(#[from] CacheEvictionError),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
