//! Write-ahead logging.
//!
//! Committed transactions are appended to a log file next to the data file
//! before any of their blocks reach the data file. On open, a non-empty log is
//! replayed into the data file and truncated.

pub mod log_file;
pub mod record;

pub use log_file::TransactionLog;
pub use record::{LogTransaction, LoggedBlock, TxnSequence};
