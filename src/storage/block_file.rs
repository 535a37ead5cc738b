//! The block store.
//!
//! Blocks move through four places while the file is open:
//!
//! - `in_use`: checked out by `get`, must come back through `release`;
//! - `dirty`: released after modification, waiting for `commit`;
//! - `clean`: unmodified (or committed) blocks kept in a bounded MRU;
//! - `in_txn`: images of committed blocks that are in the log but not yet
//!   written to the data file. Reads consult these before the data file.
//!
//! Buffers evicted from the clean MRU or discarded by a rollback are kept on a
//! small free list and reused by later reads.

use log::{debug, info, trace};
use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::config::StoreOptions;
use crate::storage::block::{zeroed_data, Block, BlockData, BlockId};
use crate::storage::disk::DataFile;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::wal::{LogTransaction, TransactionLog, TxnSequence};

/// Recycled buffers retained for reuse.
const MAX_FREE_BUFFERS: usize = 64;

/// Path of the transaction log belonging to the data file at `path`.
pub fn log_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".log");
    PathBuf::from(name)
}

pub struct BlockFile {
    data: DataFile,
    log: Option<TransactionLog>,
    in_use: HashSet<BlockId>,
    dirty: HashMap<BlockId, Block>,
    clean: LruCache<BlockId, Block>,
    in_txn: HashMap<BlockId, BlockData>,
    free: Vec<BlockData>,
    sequence: TxnSequence,
    pending_txns: usize,
    max_logged_transactions: usize,
    sync_on_commit: bool,
}

impl BlockFile {
    /// Opens the data file at `path`, replaying any transactions left in its log.
    pub fn open(path: &Path, options: &StoreOptions) -> StorageResult<Self> {
        let mut data = DataFile::open(path)?;
        let log_path = log_path_for(path);

        let mut log = None;
        if options.transactions || log_path.exists() {
            let mut existing = TransactionLog::open(&log_path, options.sync_on_commit)?;
            let replayed = Self::recover(&mut data, &mut existing)?;
            if replayed > 0 {
                info!(
                    "recovered {} transaction(s) from {:?}",
                    replayed,
                    existing.path()
                );
            }
            if options.transactions {
                log = Some(existing);
            } else {
                existing.remove()?;
            }
        }

        let cache_size =
            NonZeroUsize::new(options.block_cache_size).unwrap_or(NonZeroUsize::MIN);

        Ok(BlockFile {
            data,
            log,
            in_use: HashSet::new(),
            dirty: HashMap::new(),
            clean: LruCache::new(cache_size),
            in_txn: HashMap::new(),
            free: Vec::new(),
            sequence: TxnSequence::default(),
            pending_txns: 0,
            max_logged_transactions: options.max_logged_transactions.max(1),
            sync_on_commit: options.sync_on_commit,
        })
    }

    /// Applies every complete transaction in `log` to `data`, then empties the log.
    fn recover(data: &mut DataFile, log: &mut TransactionLog) -> StorageResult<usize> {
        let transactions = log.read_transactions()?;
        for txn in &transactions {
            for block in &txn.blocks {
                data.write_block(block.id(), block.image()?)?;
            }
            debug!("replayed {} ({} block(s))", txn.sequence, txn.len());
        }
        if !transactions.is_empty() {
            data.sync()?;
        }
        log.truncate()?;
        Ok(transactions.len())
    }

    pub fn path(&self) -> &Path {
        self.data.path()
    }

    pub fn is_transactional(&self) -> bool {
        self.log.is_some()
    }

    /// True when the data file has never been written.
    pub fn is_new(&self) -> StorageResult<bool> {
        Ok(self.data.is_empty()? && self.in_txn.is_empty() && self.dirty.is_empty())
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Committed transactions not yet written through to the data file.
    pub fn pending_transactions(&self) -> usize {
        self.pending_txns
    }

    /// Checks out block `id`. Each block may be checked out once until released.
    pub fn get(&mut self, id: BlockId) -> StorageResult<Block> {
        if !self.in_use.insert(id) {
            return Err(StorageError::BlockInUse(id));
        }

        match self.lookup(id) {
            Ok(block) => {
                trace!("get block {}", id);
                Ok(block)
            }
            Err(e) => {
                self.in_use.remove(&id);
                Err(e)
            }
        }
    }

    fn lookup(&mut self, id: BlockId) -> StorageResult<Block> {
        if let Some(block) = self.dirty.remove(&id) {
            return Ok(block);
        }
        if let Some(block) = self.clean.pop(&id) {
            return Ok(block);
        }

        let mut data = self.buffer();
        match self.in_txn.get(&id) {
            Some(image) => data.copy_from_slice(&image[..]),
            None => self.data.read_block(id, &mut data)?,
        }
        Ok(Block::new(id, data))
    }

    /// Returns a checked-out block. It joins the dirty set if `dirty` is set or
    /// it was written through its accessors.
    pub fn release(&mut self, mut block: Block, dirty: bool) -> StorageResult<()> {
        let id = block.id();
        if !self.in_use.remove(&id) {
            return Err(StorageError::BlockNotInUse(id));
        }

        if dirty {
            block.set_dirty();
        }
        if block.is_dirty() {
            self.dirty.insert(id, block);
        } else {
            self.cache_clean(block);
        }
        trace!("release block {}", id);
        Ok(())
    }

    /// Checks out `id`, runs `f` on it and releases it, even when `f` fails.
    pub fn with_block<T>(
        &mut self,
        id: BlockId,
        f: impl FnOnce(&mut Block) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut block = self.get(id)?;
        let result = f(&mut block);
        self.release(block, false)?;
        result
    }

    /// Makes every dirty block durable as one transaction.
    pub fn commit(&mut self) -> StorageResult<()> {
        self.ensure_idle("commit")?;
        if self.dirty.is_empty() {
            return Ok(());
        }

        let mut blocks: Vec<Block> = self.dirty.drain().map(|(_, block)| block).collect();
        blocks.sort_by_key(|block| block.id());

        if self.log.is_some() {
            self.sequence = self.sequence.next();
            let mut txn = LogTransaction::new(self.sequence);
            for block in &blocks {
                txn.push(block.id(), block.data());
            }
            if let Some(log) = self.log.as_mut() {
                log.append(&txn)?;
            }

            for block in &blocks {
                let mut image = self.buffer();
                image.copy_from_slice(&block.data()[..]);
                if let Some(old) = self.in_txn.insert(block.id(), image) {
                    self.recycle(old);
                }
            }
            self.pending_txns += 1;
        } else {
            for block in &blocks {
                self.data.write_block(block.id(), block.data())?;
            }
            if self.sync_on_commit {
                self.data.sync()?;
            }
        }

        debug!("committed {} block(s)", blocks.len());
        for mut block in blocks {
            block.set_clean();
            self.cache_clean(block);
        }

        if self.pending_txns >= self.max_logged_transactions {
            self.synchronize_log()?;
        }
        Ok(())
    }

    /// Discards every dirty block and writes the logged transactions through.
    pub fn rollback(&mut self) -> StorageResult<()> {
        if self.log.is_none() {
            return Err(StorageError::TransactionsDisabled);
        }
        self.ensure_idle("rollback")?;

        let discarded: Vec<BlockData> = self
            .dirty
            .drain()
            .map(|(_, block)| block.into_data())
            .collect();
        debug!("rollback discarded {} dirty block(s)", discarded.len());
        for data in discarded {
            self.recycle(data);
        }

        self.synchronize_log()
    }

    /// Writes every logged transaction into the data file and truncates the log.
    pub fn synchronize_log(&mut self) -> StorageResult<()> {
        if self.in_txn.is_empty() {
            return Ok(());
        }

        let mut ids: Vec<BlockId> = self.in_txn.keys().copied().collect();
        ids.sort();
        for id in ids {
            if let Some(image) = self.in_txn.remove(&id) {
                self.data.write_block(id, &image)?;
                self.recycle(image);
            }
        }
        self.data.sync()?;

        if let Some(log) = self.log.as_mut() {
            log.truncate()?;
        }
        debug!(
            "synchronized {} transaction(s) into {:?}",
            self.pending_txns,
            self.data.path()
        );
        self.pending_txns = 0;
        self.sequence = TxnSequence::default();
        Ok(())
    }

    /// Commits outstanding blocks, writes the log through and deletes it.
    pub fn close(&mut self) -> StorageResult<()> {
        self.commit()?;
        self.synchronize_log()?;
        self.data.sync()?;
        if let Some(log) = self.log.take() {
            log.remove()?;
        }
        self.clean.clear();
        self.free.clear();
        info!("closed {:?}", self.data.path());
        Ok(())
    }

    fn ensure_idle(&self, operation: &'static str) -> StorageResult<()> {
        if self.in_use.is_empty() {
            Ok(())
        } else {
            Err(StorageError::BlocksInUse {
                count: self.in_use.len(),
                operation,
            })
        }
    }

    fn cache_clean(&mut self, block: Block) {
        if let Some((_, evicted)) = self.clean.push(block.id(), block) {
            self.recycle(evicted.into_data());
        }
    }

    fn buffer(&mut self) -> BlockData {
        self.free.pop().unwrap_or_else(zeroed_data)
    }

    fn recycle(&mut self, data: BlockData) {
        if self.free.len() < MAX_FREE_BUFFERS {
            self.free.push(data);
        }
    }
}
