//! Raw access to the fixed-block data file.

pub mod data_file;

pub use data_file::DataFile;
