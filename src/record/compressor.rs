use std::sync::Arc;

use crate::storage::error::{StorageError, StorageResult};

/// Transforms record bytes on their way to and from disk.
pub trait Compressor: Send + Sync {
    fn name(&self) -> &str;

    fn compress(&self, data: &[u8]) -> StorageResult<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> StorageResult<Vec<u8>>;
}

pub type CompressorRef = Arc<dyn Compressor>;

/// Snappy raw-format compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnappyCompressor;

impl SnappyCompressor {
    pub const NAME: &'static str = "snappy";
}

impl Compressor for SnappyCompressor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compress(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| StorageError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| StorageError::Compression(e.to_string()))
    }
}

/// Looks up a built-in compressor by its persisted name.
pub fn compressor_by_name(name: &str) -> Option<CompressorRef> {
    match name {
        SnappyCompressor::NAME => Some(Arc::new(SnappyCompressor)),
        _ => None,
    }
}
