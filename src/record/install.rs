//! Buffered record installation.
//!
//! Small updates are staged in a [`Bucket`] the size of one data page instead
//! of being written to their rows immediately. At commit the bucket is either
//! written as one new page (when it is nearly full) or installed record by
//! record, which lets rows be updated in place or reuse free space.

use log::debug;
use std::collections::HashMap;

use crate::record::header;
use crate::record::rows::RowStore;
use crate::record::{Location, RecordId};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::DATA_PER_PAGE;

/// A record waiting in the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRecord {
    pub id: RecordId,
    pub data: Vec<u8>,
    /// Row the id pointed at when the record was staged.
    pub previous: Location,
}

/// In-memory image of one prospective data page.
///
/// The bytes of the staged records, each counted with its record header, never
/// exceed the capacity.
#[derive(Debug)]
pub struct Bucket {
    capacity: usize,
    used: usize,
    records: Vec<StagedRecord>,
    index: HashMap<RecordId, usize>,
}

impl Bucket {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.min(DATA_PER_PAGE),
            used: 0,
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn footprint(len: usize) -> usize {
        header::SIZE + len
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn available(&self) -> usize {
        self.capacity - self.used
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.index.contains_key(&id)
    }

    /// True when staging `len` bytes for `id` would stay within capacity,
    /// counting the space a replaced version gives back.
    pub fn fits(&self, id: RecordId, len: usize) -> bool {
        let released = self
            .index
            .get(&id)
            .map_or(0, |&i| Self::footprint(self.records[i].data.len()));
        self.used - released + Self::footprint(len) <= self.capacity
    }

    /// Stages `data` for `id`, replacing an earlier staged version.
    pub fn stage(&mut self, id: RecordId, data: Vec<u8>, previous: Location) -> StorageResult<()> {
        if !self.fits(id, data.len()) {
            return Err(StorageError::BucketOverflow {
                required: Self::footprint(data.len()),
                available: self.available(),
            });
        }

        let footprint = Self::footprint(data.len());
        match self.index.get(&id) {
            Some(&i) => {
                let record = &mut self.records[i];
                self.used = self.used - Self::footprint(record.data.len()) + footprint;
                record.data = data;
            }
            None => {
                self.index.insert(id, self.records.len());
                self.records.push(StagedRecord { id, data, previous });
                self.used += footprint;
            }
        }
        Ok(())
    }

    pub fn get(&self, id: RecordId) -> Option<&[u8]> {
        self.index.get(&id).map(|&i| self.records[i].data.as_slice())
    }

    pub fn remove(&mut self, id: RecordId) -> Option<StagedRecord> {
        let i = self.index.remove(&id)?;
        let record = self.records.swap_remove(i);
        if let Some(moved) = self.records.get(i) {
            self.index.insert(moved.id, i);
        }
        self.used -= Self::footprint(record.data.len());
        Some(record)
    }

    /// Empties the bucket, returning its records in staging order.
    pub fn take(&mut self) -> Vec<StagedRecord> {
        self.index.clear();
        self.used = 0;
        std::mem::take(&mut self.records)
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.records.clear();
        self.used = 0;
    }
}

/// Counters for the install paths taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallStats {
    /// Buckets written as one new page.
    pub page_flushes: u64,
    /// Records installed one at a time at commit.
    pub record_flushes: u64,
    /// Updates written straight into an existing row.
    pub in_place_writes: u64,
    /// Records too large to stage.
    pub bypassed: u64,
}

pub struct BufferedInstallManager {
    bucket: Bucket,
    waste_margin: usize,
    stats: InstallStats,
}

impl BufferedInstallManager {
    pub fn new(bucket_capacity: usize, waste_margin: usize) -> Self {
        Self {
            bucket: Bucket::new(bucket_capacity),
            waste_margin,
            stats: InstallStats::default(),
        }
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn stats(&self) -> InstallStats {
        self.stats
    }

    /// Allocates an id for `data` and stages it.
    pub fn insert(&mut self, rows: &mut RowStore, data: &[u8]) -> StorageResult<RecordId> {
        let id = rows.reserve()?;
        self.update(rows, id, data)?;
        Ok(id)
    }

    pub fn update(&mut self, rows: &mut RowStore, id: RecordId, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Err(StorageError::EmptyRecord);
        }
        let location = rows.live_location(id)?;

        if Bucket::footprint(data.len()) > self.bucket.capacity() {
            self.bucket.remove(id);
            rows.install(id, data)?;
            self.stats.bypassed += 1;
            return Ok(());
        }

        if location.has_row() && rows.physical().capacity(location)? as usize >= data.len() {
            self.bucket.remove(id);
            rows.physical().write_in_place(location, data)?;
            self.stats.in_place_writes += 1;
            return Ok(());
        }

        let previous = if self.bucket.fits(id, data.len()) {
            location
        } else {
            self.flush_page(rows)?;
            rows.live_location(id)?
        };
        self.bucket.stage(id, data.to_vec(), previous)
    }

    /// Staged bytes for `id` if any, otherwise the stored record.
    pub fn fetch(&self, rows: &mut RowStore, id: RecordId) -> StorageResult<Option<Vec<u8>>> {
        if let Some(data) = self.bucket.get(id) {
            return Ok(Some(data.to_vec()));
        }
        rows.read(id)
    }

    /// Drops any staged version of `id`.
    pub fn delete(&mut self, id: RecordId) {
        self.bucket.remove(id);
    }

    /// Installs everything staged, choosing the strategy by bucket occupancy.
    pub fn commit(&mut self, rows: &mut RowStore) -> StorageResult<()> {
        if self.bucket.is_empty() {
            return Ok(());
        }
        if self.bucket.used() + self.waste_margin >= self.bucket.capacity() {
            self.flush_page(rows)
        } else {
            self.flush_records(rows)
        }
    }

    pub fn abort(&mut self) {
        if !self.bucket.is_empty() {
            debug!("discarding {} staged record(s)", self.bucket.len());
        }
        self.bucket.clear();
    }

    /// Writes the bucket onto one new page and repoints every staged id.
    fn flush_page(&mut self, rows: &mut RowStore) -> StorageResult<()> {
        if self.bucket.is_empty() {
            return Ok(());
        }
        let used = self.bucket.used();
        let records = self.bucket.take();
        let data: Vec<&[u8]> = records.iter().map(|r| r.data.as_slice()).collect();
        let locations = rows.physical().install_page(&data)?;

        for (record, location) in records.iter().zip(locations) {
            if record.previous.has_row() {
                rows.physical().delete(record.previous)?;
            }
            rows.logical().update(record.id, location)?;
        }

        self.stats.page_flushes += 1;
        debug!(
            "installed {} record(s) as one page ({} of {} bytes)",
            records.len(),
            used,
            self.bucket.capacity()
        );
        Ok(())
    }

    fn flush_records(&mut self, rows: &mut RowStore) -> StorageResult<()> {
        let records = self.bucket.take();
        for record in &records {
            rows.install(record.id, &record.data)?;
        }
        self.stats.record_flushes += records.len() as u64;
        debug!("installed {} record(s) individually", records.len());
        Ok(())
    }
}
