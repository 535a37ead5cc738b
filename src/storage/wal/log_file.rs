//! The transaction log file.
//!
//! Layout: a 4-byte magic followed by frames of
//! `[payload length u32][crc32 of payload u32][bincode LogTransaction]`.
//! A frame cut short by a crash, or one whose checksum does not match, ends
//! the readable log; everything before it is replayed.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::record::LogTransaction;
use crate::storage::error::{StorageError, StorageResult};

/// Magic number at the start of every non-empty log file.
const LOG_MAGIC: u32 = 0x5642_4C47;

const MAGIC_SIZE: u64 = 4;

/// Append-only log of committed transactions.
pub struct TransactionLog {
    file: File,
    path: PathBuf,
    sync_on_commit: bool,
}

impl TransactionLog {
    /// Opens the log at `path`, creating it if missing. Existing contents are kept
    /// so that they can be recovered.
    pub fn open(path: &Path, sync_on_commit: bool) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(TransactionLog {
            file,
            path: path.to_path_buf(),
            sync_on_commit,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the log holds no transactions.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.file.metadata()?.len() <= MAGIC_SIZE)
    }

    /// Appends `txn` as one frame and makes it durable.
    pub fn append(&mut self, txn: &LogTransaction) -> StorageResult<()> {
        let payload = txn.serialize()?;
        let checksum = crc32fast::hash(&payload);

        let end = self.file.seek(SeekFrom::End(0))?;
        let mut frame = Vec::with_capacity(payload.len() + 12);
        if end == 0 {
            frame.write_u32::<BigEndian>(LOG_MAGIC)?;
        }
        frame.write_u32::<LittleEndian>(payload.len() as u32)?;
        frame.write_u32::<LittleEndian>(checksum)?;
        frame.extend_from_slice(&payload);

        self.file.write_all(&frame)?;
        self.file.flush()?;
        if self.sync_on_commit {
            self.file.sync_data()?;
        }

        debug!(
            "logged {} with {} block(s) to {:?}",
            txn.sequence,
            txn.len(),
            self.path
        );
        Ok(())
    }

    /// Reads every complete transaction in commit order.
    pub fn read_transactions(&mut self) -> StorageResult<Vec<LogTransaction>> {
        let len = self.file.metadata()?.len();
        if len == 0 {
            return Ok(Vec::new());
        }

        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut self.file);

        let magic = match reader.read_u32::<BigEndian>() {
            Ok(magic) => magic,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if magic != LOG_MAGIC {
            return Err(StorageError::Corrupted(format!(
                "bad log magic {:#x} in {:?}",
                magic, self.path
            )));
        }

        let mut transactions = Vec::new();
        loop {
            let size = match reader.read_u32::<LittleEndian>() {
                Ok(size) => size as usize,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            let checksum = match reader.read_u32::<LittleEndian>() {
                Ok(checksum) => checksum,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!("torn frame header at end of {:?}", self.path);
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            if size as u64 > len {
                warn!("frame length {} exceeds the size of {:?}", size, self.path);
                break;
            }
            let mut payload = vec![0u8; size];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!("torn frame payload at end of {:?}", self.path);
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            if crc32fast::hash(&payload) != checksum {
                warn!(
                    "checksum mismatch after {} transaction(s) in {:?}",
                    transactions.len(),
                    self.path
                );
                break;
            }

            transactions.push(LogTransaction::deserialize(&payload)?);
        }

        Ok(transactions)
    }

    /// Discards every logged transaction.
    pub fn truncate(&mut self) -> StorageResult<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Deletes the log file.
    pub fn remove(self) -> StorageResult<()> {
        let path = self.path.clone();
        drop(self.file);
        fs::remove_file(&path)?;
        Ok(())
    }
}
