//! Partition Module
//!
//! Physical storage for one numbered partition of a store.
//!
//! ## Responsibilities
//! - `StoragePartition`: an open partition handle, shared by the engine
//!   registry and request paths through `Arc`
//! - `PartitionFactory`: opens an existing partition or creates it fresh,
//!   and reports which partitions it has persisted
//!
//! Backends are picked by `PersistenceType`:
//! - `Table`: one directory per partition holding a checksummed table file
//! - `InMemory`: nothing touches disk

mod memory;
mod table;
mod table_file;

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::{PersistenceType, TableFormat};
use crate::error::Result;
use crate::store_dir::StoreDirectory;

pub use memory::{InMemoryPartition, InMemoryPartitionFactory};
pub use table::{TablePartition, TablePartitionFactory};

/// Everything a factory needs to open one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionConfig {
    pub store_name: String,
    pub partition_id: i32,
    pub table_format: TableFormat,
}

impl PartitionConfig {
    pub fn new(store_name: &str, partition_id: i32, table_format: TableFormat) -> Self {
        Self {
            store_name: store_name.to_string(),
            partition_id,
            table_format,
        }
    }
}

/// An open partition
///
/// All methods take `&self`; implementations guard their own state.
pub trait StoragePartition: Send + Sync {
    fn partition_id(&self) -> i32;

    /// Format the partition was opened with
    fn table_format(&self) -> TableFormat;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Make all writes so far durable
    fn sync(&self) -> Result<()>;

    /// Bytes used by this partition on disk
    fn size_in_bytes(&self) -> u64;

    /// Sync and release; the data stays on disk
    fn close(&self) -> Result<()>;

    /// Release and delete the partition's physical storage
    fn drop_storage(&self) -> Result<()>;
}

/// Opens partitions for one backend kind
pub trait PartitionFactory: Send + Sync {
    fn kind(&self) -> PersistenceType;

    /// Open the partition at its deterministic location, creating it if it
    /// does not exist yet
    ///
    /// Implementations must refuse to open storage written in a different
    /// table format rather than attach to it.
    fn create_partition(
        &self,
        store_dir: &StoreDirectory,
        config: &PartitionConfig,
    ) -> Result<Arc<dyn StoragePartition>>;

    /// Partition ids this backend has persisted for the store
    fn list_persisted_partition_ids(&self, store_dir: &StoreDirectory) -> Result<BTreeSet<i32>>;
}

/// Factory for `kind`
pub fn factory_for(kind: PersistenceType) -> Arc<dyn PartitionFactory> {
    match kind {
        PersistenceType::Table => Arc::new(TablePartitionFactory),
        PersistenceType::InMemory => Arc::new(InMemoryPartitionFactory),
    }
}
