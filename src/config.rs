//! Store configuration.
//!
//! `StoreOptions` is supplied every time a store is opened. The subset that
//! must never change over the life of a store is captured in `StickyOptions`
//! and persisted in a reserved root slot when the store is created.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::record::serializer::{ByteArraySerializer, SerializerRef};
use crate::storage::page::DATA_PER_PAGE;

/// Default number of object cache entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Default number of clean blocks kept in memory by the block file.
pub const DEFAULT_BLOCK_CACHE_SIZE: usize = 128;

/// Default number of committed transactions held in the log before it is
/// written through to the data file.
pub const DEFAULT_MAX_LOGGED_TRANSACTIONS: usize = 10;

/// Default slack, in bytes short of a full bucket, that still counts as a full page.
pub const DEFAULT_WASTE_MARGIN: usize = 128;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Object cache placed in front of the record manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOptions {
    /// No object cache: every operation goes straight to the store.
    Disabled,
    /// Bounded most-recently-used cache.
    Mru { capacity: usize },
    /// Bounded cache backed by a larger, best-effort reclaimable tier.
    Soft {
        capacity: usize,
        reclaimable_capacity: usize,
    },
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions::Mru {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Options for opening a store.
#[derive(Clone)]
pub struct StoreOptions {
    /// Log committed blocks before they reach the data file.
    pub transactions: bool,
    /// Sync the log (or the data file, without transactions) on every commit.
    pub sync_on_commit: bool,
    /// Committed transactions kept in the log before writing them through.
    pub max_logged_transactions: usize,
    /// Clean blocks retained in memory.
    pub block_cache_size: usize,
    /// Stage small records in a page-sized bucket and install them at commit.
    pub buffered_install: bool,
    /// Bucket capacity in bytes, record headers included. Clamped to one data page.
    pub bucket_capacity: usize,
    /// A bucket within this many bytes of full is installed as a whole page.
    pub waste_margin: usize,
    /// Compress record bytes (fixed when the store is created).
    pub compression: bool,
    /// Object cache in front of the store.
    pub cache: CacheOptions,
    /// Serializer used when none is given (the `*_object` helpers); persisted at creation.
    pub default_serializer: SerializerRef,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            transactions: true,
            sync_on_commit: true,
            max_logged_transactions: DEFAULT_MAX_LOGGED_TRANSACTIONS,
            block_cache_size: DEFAULT_BLOCK_CACHE_SIZE,
            buffered_install: false,
            bucket_capacity: DATA_PER_PAGE,
            waste_margin: DEFAULT_WASTE_MARGIN,
            compression: false,
            cache: CacheOptions::default(),
            default_serializer: Arc::new(ByteArraySerializer),
        }
    }
}

impl StoreOptions {
    pub fn with_transactions(mut self, enabled: bool) -> Self {
        self.transactions = enabled;
        self
    }

    pub fn with_sync_on_commit(mut self, enabled: bool) -> Self {
        self.sync_on_commit = enabled;
        self
    }

    pub fn with_max_logged_transactions(mut self, count: usize) -> Self {
        self.max_logged_transactions = count.max(1);
        self
    }

    pub fn with_block_cache_size(mut self, blocks: usize) -> Self {
        self.block_cache_size = blocks;
        self
    }

    /// Enables buffered installation with the given bucket capacity.
    pub fn with_buffered_install(mut self, bucket_capacity: usize) -> Self {
        self.buffered_install = true;
        self.bucket_capacity = bucket_capacity.min(DATA_PER_PAGE);
        self
    }

    pub fn with_waste_margin(mut self, bytes: usize) -> Self {
        self.waste_margin = bytes;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn with_cache(mut self, cache: CacheOptions) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_default_serializer(mut self, serializer: SerializerRef) -> Self {
        self.default_serializer = serializer;
        self
    }

    /// The sticky options a new store created with these options records.
    pub fn sticky(&self) -> StickyOptions {
        StickyOptions {
            format_version: FORMAT_VERSION,
            compressor: self.compression.then(|| "snappy".to_string()),
        }
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("transactions", &self.transactions)
            .field("sync_on_commit", &self.sync_on_commit)
            .field("max_logged_transactions", &self.max_logged_transactions)
            .field("block_cache_size", &self.block_cache_size)
            .field("buffered_install", &self.buffered_install)
            .field("bucket_capacity", &self.bucket_capacity)
            .field("waste_margin", &self.waste_margin)
            .field("compression", &self.compression)
            .field("cache", &self.cache)
            .field("default_serializer", &self.default_serializer.name())
            .finish()
    }
}

/// Options fixed when a store is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickyOptions {
    pub format_version: u32,
    /// Name of the compressor applied to record bytes, if any.
    pub compressor: Option<String>,
}
