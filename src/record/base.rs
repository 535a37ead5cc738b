//! The base record manager: rows, optional buffered installation, the
//! compressor and the metadata kept in the reserved root slots.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::Path;

use crate::config::{StickyOptions, StoreOptions, FORMAT_VERSION};
use crate::record::compressor::{compressor_by_name, CompressorRef};
use crate::record::install::{BufferedInstallManager, InstallStats};
use crate::record::manager::RecordManager;
use crate::record::rows::RowStore;
use crate::record::serializer::{Object, SerializerRef};
use crate::record::RecordId;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::file_header::NROOTS;
use crate::storage::PageManager;

/// Root slot holding the name directory record.
pub const NAME_DIRECTORY_ROOT: usize = 0;
/// Root slot holding the sticky options record.
pub const STICKY_OPTIONS_ROOT: usize = 1;
/// Root slot holding the default serializer's name.
pub const DEFAULT_SERIALIZER_ROOT: usize = 2;
/// Slots before the first application root.
pub const RESERVED_ROOTS: usize = 3;

type NameDirectory = HashMap<String, u64>;

pub struct BaseRecordManager {
    rows: RowStore,
    installer: Option<BufferedInstallManager>,
    compressor: Option<CompressorRef>,
    default_serializer: SerializerRef,
    sticky: StickyOptions,
    names: Option<NameDirectory>,
    closed: bool,
}

impl BaseRecordManager {
    /// Opens the store at `path`, creating it when the file does not exist.
    pub fn open(path: &Path, options: &StoreOptions) -> StorageResult<Self> {
        Self::open_checked(path, options, true)
    }

    /// Opens an existing store for reading its pages, roots and names. The
    /// persisted default serializer is not compared with `options`.
    pub fn open_for_inspection(path: &Path, options: &StoreOptions) -> StorageResult<Self> {
        Self::open_checked(path, options, false)
    }

    fn open_checked(
        path: &Path,
        options: &StoreOptions,
        check_serializer: bool,
    ) -> StorageResult<Self> {
        let mut rows = RowStore::open(path, options)?;

        let sticky_root = RecordId(rows.pages().root(STICKY_OPTIONS_ROOT)?);
        let sticky = if sticky_root.is_none() {
            Self::initialize(&mut rows, options)?
        } else {
            Self::load(&mut rows, sticky_root, options, check_serializer)?
        };

        let compressor = match &sticky.compressor {
            Some(name) => Some(compressor_by_name(name).ok_or_else(|| {
                StorageError::Corrupted(format!("unknown compressor '{}'", name))
            })?),
            None => None,
        };

        let installer = options.buffered_install.then(|| {
            BufferedInstallManager::new(options.bucket_capacity, options.waste_margin)
        });

        info!(
            "opened {:?} (transactions: {}, buffered install: {}, compressor: {})",
            path,
            options.transactions,
            options.buffered_install,
            sticky.compressor.as_deref().unwrap_or("none")
        );

        Ok(Self {
            rows,
            installer,
            compressor,
            default_serializer: options.default_serializer.clone(),
            sticky,
            names: None,
            closed: false,
        })
    }

    /// Records the sticky options and default serializer of a new store.
    fn initialize(rows: &mut RowStore, options: &StoreOptions) -> StorageResult<StickyOptions> {
        let sticky = options.sticky();
        let bytes =
            bincode::serialize(&sticky).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let sticky_id = rows.allocate(&bytes)?;
        rows.pages().set_root(STICKY_OPTIONS_ROOT, sticky_id.0)?;

        let serializer_id = rows.allocate(options.default_serializer.name().as_bytes())?;
        rows.pages().set_root(DEFAULT_SERIALIZER_ROOT, serializer_id.0)?;

        rows.commit()?;
        debug!("recorded sticky options {:?}", sticky);
        Ok(sticky)
    }

    fn load(
        rows: &mut RowStore,
        sticky_root: RecordId,
        options: &StoreOptions,
        check_serializer: bool,
    ) -> StorageResult<StickyOptions> {
        let bytes = rows
            .read(sticky_root)?
            .ok_or_else(|| StorageError::Corrupted("sticky options record is missing".into()))?;
        let sticky: StickyOptions =
            bincode::deserialize(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;

        if sticky.format_version != FORMAT_VERSION {
            return Err(StorageError::Corrupted(format!(
                "unsupported format version {}",
                sticky.format_version
            )));
        }
        if sticky.compressor.is_some() != options.compression {
            warn!(
                "store was created with compressor {:?}; ignoring compression = {}",
                sticky.compressor, options.compression
            );
        }

        if !check_serializer {
            return Ok(sticky);
        }
        let serializer_root = RecordId(rows.pages().root(DEFAULT_SERIALIZER_ROOT)?);
        let stored = rows
            .read(serializer_root)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        let configured = options.default_serializer.name();
        if stored != configured {
            return Err(StorageError::SerializerMismatch {
                stored,
                configured: configured.to_string(),
            });
        }

        Ok(sticky)
    }

    pub fn sticky_options(&self) -> &StickyOptions {
        &self.sticky
    }

    pub fn install_stats(&self) -> Option<InstallStats> {
        self.installer.as_ref().map(|installer| installer.stats())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Direct access to the page lists, for inspection.
    pub fn pages(&mut self) -> StorageResult<&mut PageManager> {
        self.check_open()?;
        Ok(self.rows.pages())
    }

    /// All bound names.
    pub fn named_objects(&mut self) -> StorageResult<Vec<(String, RecordId)>> {
        self.check_open()?;
        let mut names: Vec<(String, RecordId)> = self
            .names()?
            .iter()
            .map(|(name, &id)| (name.clone(), RecordId(id)))
            .collect();
        names.sort();
        Ok(names)
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_root(&self, index: usize) -> StorageResult<()> {
        if index < self.root_count() {
            Ok(())
        } else {
            Err(StorageError::InvalidRoot {
                index,
                max: self.root_count(),
            })
        }
    }

    fn encode(&self, object: &Object, serializer: &SerializerRef) -> StorageResult<Vec<u8>> {
        let bytes = serializer.serialize(object)?;
        match &self.compressor {
            Some(compressor) => compressor.compress(&bytes),
            None => Ok(bytes),
        }
    }

    fn decode(&self, bytes: &[u8], serializer: &SerializerRef) -> StorageResult<Object> {
        match &self.compressor {
            Some(compressor) => serializer.deserialize(&compressor.decompress(bytes)?),
            None => serializer.deserialize(bytes),
        }
    }

    fn names(&mut self) -> StorageResult<&mut NameDirectory> {
        if self.names.is_none() {
            let root = RecordId(self.rows.pages().root(NAME_DIRECTORY_ROOT)?);
            let directory = if root.is_none() {
                NameDirectory::new()
            } else {
                let bytes = self.rows.read(root)?.ok_or_else(|| {
                    StorageError::Corrupted("name directory record is missing".into())
                })?;
                bincode::deserialize(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?
            };
            self.names = Some(directory);
        }
        Ok(self.names.get_or_insert_with(NameDirectory::new))
    }

    fn save_names(&mut self) -> StorageResult<()> {
        let bytes = bincode::serialize(&*self.names()?)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let root = RecordId(self.rows.pages().root(NAME_DIRECTORY_ROOT)?);
        if root.is_none() {
            let id = self.rows.allocate(&bytes)?;
            self.rows.pages().set_root(NAME_DIRECTORY_ROOT, id.0)?;
            debug!("created name directory {}", id);
        } else {
            self.rows.install(root, &bytes)?;
        }
        Ok(())
    }
}

impl RecordManager for BaseRecordManager {
    fn insert(&mut self, object: &Object, serializer: &SerializerRef) -> StorageResult<RecordId> {
        self.check_open()?;
        let data = self.encode(object, serializer)?;
        match self.installer.as_mut() {
            Some(installer) => installer.insert(&mut self.rows, &data),
            None => self.rows.allocate(&data),
        }
    }

    fn update(
        &mut self,
        id: RecordId,
        object: &Object,
        serializer: &SerializerRef,
    ) -> StorageResult<()> {
        self.check_open()?;
        let data = self.encode(object, serializer)?;
        match self.installer.as_mut() {
            Some(installer) => installer.update(&mut self.rows, id, &data),
            None => self.rows.install(id, &data),
        }
    }

    fn fetch(
        &mut self,
        id: RecordId,
        serializer: &SerializerRef,
    ) -> StorageResult<Option<Object>> {
        self.check_open()?;
        let data = match self.installer.as_ref() {
            Some(installer) => installer.fetch(&mut self.rows, id)?,
            None => self.rows.read(id)?,
        };
        data.map(|bytes| self.decode(&bytes, serializer)).transpose()
    }

    fn delete(&mut self, id: RecordId) -> StorageResult<()> {
        self.check_open()?;
        if let Some(installer) = self.installer.as_mut() {
            installer.delete(id);
        }
        self.rows.remove(id)
    }

    fn check_record(&mut self, id: RecordId) -> StorageResult<()> {
        self.check_open()?;
        self.rows.live_location(id).map(|_| ())
    }

    fn reserve(&mut self) -> StorageResult<RecordId> {
        self.check_open()?;
        self.rows.reserve()
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.check_open()?;
        if let Some(installer) = self.installer.as_mut() {
            installer.commit(&mut self.rows)?;
        }
        self.rows.commit()
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.check_open()?;
        if !self.rows.is_transactional() {
            return Err(StorageError::TransactionsDisabled);
        }
        if let Some(installer) = self.installer.as_mut() {
            installer.abort();
        }
        self.names = None;
        self.rows.rollback()
    }

    fn close(&mut self) -> StorageResult<()> {
        if self.closed {
            return Ok(());
        }
        self.commit()?;
        self.rows.close()?;
        self.closed = true;
        Ok(())
    }

    fn root_count(&self) -> usize {
        NROOTS - RESERVED_ROOTS
    }

    fn get_root(&mut self, index: usize) -> StorageResult<RecordId> {
        self.check_open()?;
        self.check_root(index)?;
        Ok(RecordId(self.rows.pages().root(index + RESERVED_ROOTS)?))
    }

    fn set_root(&mut self, index: usize, id: RecordId) -> StorageResult<()> {
        self.check_open()?;
        self.check_root(index)?;
        self.rows.pages().set_root(index + RESERVED_ROOTS, id.0)
    }

    fn get_named_object(&mut self, name: &str) -> StorageResult<Option<RecordId>> {
        self.check_open()?;
        Ok(self.names()?.get(name).map(|&id| RecordId(id)))
    }

    fn set_named_object(&mut self, name: &str, id: RecordId) -> StorageResult<()> {
        self.check_open()?;
        let names = self.names()?;
        let changed = if id.is_none() {
            names.remove(name).is_some()
        } else {
            names.insert(name.to_string(), id.0) != Some(id.0)
        };
        if changed {
            self.save_names()?;
        }
        Ok(())
    }

    fn default_serializer(&self) -> SerializerRef {
        self.default_serializer.clone()
    }
}

impl Drop for BaseRecordManager {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!("failed to close record manager: {}", e);
            }
        }
    }
}
