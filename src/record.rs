//! Records on top of the page lists.
//!
//! - **PhysicalRowManager**: variable-length rows on data pages
//! - **LogicalRowManager**: stable ids translated to row locations
//! - **BufferedInstallManager**: page-sized staging of small updates
//! - **BaseRecordManager**: the [`RecordManager`] that ties these together with
//!   serialization, compression and the reserved root slots

pub mod base;
pub mod compressor;
pub mod free_logical;
pub mod free_physical;
pub mod header;
pub mod install;
pub mod location;
pub mod logical;
pub mod manager;
pub mod physical;
pub mod rows;
pub mod serializer;

pub use base::BaseRecordManager;
pub use compressor::{Compressor, CompressorRef, SnappyCompressor};
pub use install::{Bucket, BufferedInstallManager, InstallStats};
pub use location::{Location, RecordId};
pub use manager::{RecordManager, RecordManagerExt};
pub use rows::RowStore;
pub use serializer::{
    bincode_serializer, bytes_serializer, BincodeSerializer, ByteArraySerializer, Object,
    Serializer, SerializerRef,
};
