//! In-memory partition backend
//!
//! Nothing is written to disk, so a reopened store starts empty.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::config::{PersistenceType, TableFormat};
use crate::error::{PartKvError, Result};
use crate::store_dir::StoreDirectory;

use super::{PartitionConfig, PartitionFactory, StoragePartition};

pub struct InMemoryPartition {
    partition_id: i32,
    table_format: TableFormat,
    entries: RwLock<BTreeMap<Vec<u8>, Bytes>>,
    closed: AtomicBool,
}

impl InMemoryPartition {
    pub fn new(config: &PartitionConfig) -> Self {
        Self {
            partition_id: config.partition_id,
            table_format: config.table_format,
            entries: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PartKvError::PartitionClosed(self.partition_id));
        }
        Ok(())
    }
}

impl StoragePartition for InMemoryPartition {
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
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.ensure_open()
    }

    fn size_in_bytes(&self) -> u64 {
        0
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn drop_storage(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.entries.write().clear();
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryPartitionFactory;

impl PartitionFactory for InMemoryPartitionFactory {
    fn kind(&self) -> PersistenceType {
        PersistenceType::InMemory
    }

    fn create_partition(
        &self,
        _store_dir: &StoreDirectory,
        config: &PartitionConfig,
    ) -> Result<Arc<dyn StoragePartition>> {
        Ok(Arc::new(InMemoryPartition::new(config)))
    }

    /// Nothing survives a restart
    fn list_persisted_partition_ids(&self, _store_dir: &StoreDirectory) -> Result<BTreeSet<i32>> {
        Ok(BTreeSet::new())
    }
}
