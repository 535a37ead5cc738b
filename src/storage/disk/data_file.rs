use crate::storage::block::{BlockId, BLOCK_SIZE};
use crate::storage::error::StorageResult;
use log::trace;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// The data file: a flat array of `BLOCK_SIZE` blocks addressed by `BlockId`.
pub struct DataFile {
    file: File,
    path: PathBuf,
}

impl DataFile {
    /// Opens the data file at `path`, creating an empty one if it does not exist.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads block `id` into `buf`. Blocks past the end of the file read as zeros.
    pub fn read_block(&mut self, id: BlockId, buf: &mut [u8; BLOCK_SIZE]) -> StorageResult<()> {
        let offset = id.file_offset();
        let file_size = self.file.metadata()?.len();

        if offset >= file_size {
            buf.fill(0);
            return Ok(());
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        trace!("read block {} from {:?}", id, self.path);

        Ok(())
    }

    /// Writes block `id`, extending the file when the block lies past its end.
    pub fn write_block(&mut self, id: BlockId, data: &[u8; BLOCK_SIZE]) -> StorageResult<()> {
        let offset = id.file_offset();
        let file_size = self.file.metadata()?.len();

        if offset > file_size {
            self.file.set_len(offset)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        trace!("wrote block {} to {:?}", id, self.path);

        Ok(())
    }

    pub fn num_blocks(&self) -> StorageResult<u64> {
        let file_size = self.file.metadata()?.len();
        Ok(file_size / BLOCK_SIZE as u64)
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.file.metadata()?.len() == 0)
    }

    /// Flushes file contents and metadata to stable storage.
    pub fn sync(&mut self) -> StorageResult<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}
