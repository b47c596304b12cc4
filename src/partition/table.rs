//! Table partition backend
//!
//! Each partition lives in its own directory (`{store}_{id}`) and keeps its
//! entries in memory, writing them out as a single table file on `sync`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::{PersistenceType, TableFormat};
use crate::error::{PartKvError, Result};
use crate::store_dir::{self, StoreDirectory};

use super::table_file;
use super::{PartitionConfig, PartitionFactory, StoragePartition};

/// On-disk partition
///
/// ## Concurrency:
/// - `entries`: RwLock (many concurrent readers, exclusive writer)
/// - `sync_lock`: serializes table file rewrites
/// - `dirty` / `closed`: atomics, lock-free
pub struct TablePartition {
    partition_id: i32,
    table_format: TableFormat,

    /// Partition directory
    dir: PathBuf,

    entries: RwLock<BTreeMap<Vec<u8>, Bytes>>,

    /// Set when `entries` differ from the table file
    dirty: AtomicBool,

    /// Set once closed or dropped; every later call fails
    closed: AtomicBool,

    sync_lock: Mutex<()>,
}

impl TablePartition {
    const DATA_FILENAME: &'static str = "data.tbl";

    /// Open the partition stored in `dir`, creating it if absent
    ///
    /// An existing table file written with another format is rejected.
    pub fn open(dir: &Path, config: &PartitionConfig) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let data_path = dir.join(Self::DATA_FILENAME);

        let entries = if data_path.exists() {
            let contents = table_file::read_table(&data_path)?;
            if contents.format != config.table_format {
                return Err(PartKvError::FormatMismatch {
                    partition_id: config.partition_id,
                    expected: config.table_format,
                    found: contents.format,
                });
            }
            debug!(
                partition = config.partition_id,
                entries = contents.entries.len(),
                "Opened existing table partition"
            );
            contents.entries
        } else {
            // Record the format right away so a later open can verify it
            let empty: BTreeMap<Vec<u8>, Bytes> = BTreeMap::new();
            table_file::write_table(&data_path, config.table_format, &empty)?;
            debug!(partition = config.partition_id, "Created table partition");
            empty
        };

        Ok(Self {
            partition_id: config.partition_id,
            table_format: config.table_format,
            dir: dir.to_path_buf(),
            entries: RwLock::new(entries),
            dirty: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            sync_lock: Mutex::new(()),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PartKvError::PartitionClosed(self.partition_id));
        }
        Ok(())
    }

    /// Rewrite the table file if anything changed (caller checked `closed`)
    fn sync_internal(&self) -> Result<()> {
        let _guard = self.sync_lock.lock();

        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let snapshot = self.entries.read().clone();
        let data_path = self.dir.join(Self::DATA_FILENAME);
        if let Err(e) = table_file::write_table(&data_path, self.table_format, &snapshot) {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }
}

impl StoragePartition for TablePartition {
    fn partition_id(&self) -> i32 {
        self.partition_id
    }

    fn table_format(&self) -> TableFormat {
        self.table_format
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.entries
            .write()
            .insert(key.to_vec(), Bytes::copy_from_slice(value));
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if self.entries.write().remove(key).is_some() {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        self.sync_internal()
    }

    fn size_in_bytes(&self) -> u64 {
        store_dir::dir_size(&self.dir)
    }

    fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.sync_internal()?;
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    /// A failed delete leaves the partition open with its entries intact
    fn drop_storage(&self) -> Result<()> {
        let _guard = self.sync_lock.lock();
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }

        self.closed.store(true, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
        self.entries.write().clear();
        info!(partition = self.partition_id, dir = %self.dir.display(), "Removed partition storage");
        Ok(())
    }
}

/// Factory for `TablePartition`s under a store directory
#[derive(Debug, Default, Clone, Copy)]
pub struct TablePartitionFactory;

impl PartitionFactory for TablePartitionFactory {
    fn kind(&self) -> PersistenceType {
        PersistenceType::Table
    }

    fn create_partition(
        &self,
        store_dir: &StoreDirectory,
        config: &PartitionConfig,
    ) -> Result<Arc<dyn StoragePartition>> {
        if config.store_name != store_dir.store_name() {
            return Err(PartKvError::Config(format!(
                "partition config for store {:?} used with store {:?}",
                config.store_name,
                store_dir.store_name()
            )));
        }

        let dir = store_dir.partition_dir(config.partition_id);
        let partition = TablePartition::open(&dir, config)?;
        Ok(Arc::new(partition))
    }

    fn list_persisted_partition_ids(&self, store_dir: &StoreDirectory) -> Result<BTreeSet<i32>> {
        store_dir.list_persisted_partition_ids()
    }
}
