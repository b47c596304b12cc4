//! Configuration for partkv
//!
//! Per-store configuration with sensible defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::partition::PartitionConfig;
use crate::store_dir::{PersistedEngineConfig, PLAIN_TABLE_FORMAT_KEY};

/// Configuration for a single store's storage engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory shared by all stores on this node
    /// Internal structure:
    ///   {root_dir}/
    ///     └── {store_name}/
    ///           ├── {store_name}_-1/     (metadata partition + engineConfig)
    ///           ├── {store_name}_0/
    ///           └── ...
    pub root_dir: PathBuf,

    /// Logical store name
    pub store_name: String,

    /// Which partition backend opens the partitions
    pub persistence_type: PersistenceType,

    /// Physical table format partitions are created with
    pub table_format: TableFormat,

    // -------------------------------------------------------------------------
    // Lifecycle Flags
    // -------------------------------------------------------------------------
    /// Compare the persisted table format against `table_format` when reopening
    pub validate_config_on_reopen: bool,

    /// Open (or create) the metadata partition at startup; this also makes the
    /// engine the owner of the store directory
    pub restore_metadata_partition: bool,

    /// Reopen every data partition found on disk at startup
    pub restore_data_partitions: bool,

    /// Worker threads used to reopen data partitions
    pub restore_threads: usize,

    /// Extra entries written alongside the table format flag
    pub engine_properties: BTreeMap<String, String>,
}

/// Backend used to open partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistenceType {
    /// One directory per partition with a checksummed table file
    Table,

    /// Partitions live only in memory (nothing restored on reopen)
    InMemory,
}

/// Physical table layout of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableFormat {
    PlainTable,
    BlockBasedTable,
}

impl TableFormat {
    /// Value of the persisted `plain table enabled` flag
    pub fn is_plain_table(self) -> bool {
        matches!(self, TableFormat::PlainTable)
    }

    pub fn from_plain_table_flag(plain: bool) -> Self {
        if plain {
            TableFormat::PlainTable
        } else {
            TableFormat::BlockBasedTable
        }
    }

    pub(crate) fn as_byte(self) -> u8 {
        match self {
            TableFormat::PlainTable => 1,
            TableFormat::BlockBasedTable => 2,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(TableFormat::PlainTable),
            2 => Some(TableFormat::BlockBasedTable),
            _ => None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./partkv_data"),
            store_name: "default".to_string(),
            persistence_type: PersistenceType::Table,
            table_format: TableFormat::BlockBasedTable,
            validate_config_on_reopen: true,
            restore_metadata_partition: true,
            restore_data_partitions: true,
            restore_threads: 4,
            engine_properties: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// The record persisted under the metadata partition on first open
    ///
    /// The format flag always reflects `table_format`; an engine property
    /// with the same key is ignored.
    pub fn persisted_engine_config(&self) -> PersistedEngineConfig {
        let mut config = PersistedEngineConfig::new(self.table_format);
        for (key, value) in &self.engine_properties {
            if key == PLAIN_TABLE_FORMAT_KEY {
                continue;
            }
            config.set(key.clone(), value.clone());
        }
        config
    }

    /// Partition config for `partition_id` in this store
    pub fn partition_config(&self, partition_id: i32) -> PartitionConfig {
        PartitionConfig::new(&self.store_name, partition_id, self.table_format)
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the root directory (parent of every store directory)
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root_dir = path.into();
        self
    }

    /// Set the store name
    pub fn store_name(mut self, name: impl Into<String>) -> Self {
        self.config.store_name = name.into();
        self
    }

    /// Set the partition backend
    pub fn persistence_type(mut self, kind: PersistenceType) -> Self {
        self.config.persistence_type = kind;
        self
    }

    /// Set the physical table format
    pub fn table_format(mut self, format: TableFormat) -> Self {
        self.config.table_format = format;
        self
    }

    /// Enable/disable format validation on reopen
    pub fn validate_config_on_reopen(mut self, enabled: bool) -> Self {
        self.config.validate_config_on_reopen = enabled;
        self
    }

    /// Enable/disable metadata partition restore (and directory ownership)
    pub fn restore_metadata_partition(mut self, enabled: bool) -> Self {
        self.config.restore_metadata_partition = enabled;
        self
    }

    /// Enable/disable data partition restore
    pub fn restore_data_partitions(mut self, enabled: bool) -> Self {
        self.config.restore_data_partitions = enabled;
        self
    }

    /// Set the number of restore worker threads (minimum 1)
    pub fn restore_threads(mut self, threads: usize) -> Self {
        self.config.restore_threads = threads.max(1);
        self
    }

    /// Add an entry to the persisted engine config
    pub fn engine_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.engine_properties.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}
