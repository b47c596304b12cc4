//! Engine Module
//!
//! Per-store storage engine: owns the open partitions of one store.
//!
//! ## Responsibilities
//! - Resolve/create the store directory and guard its table format
//! - Restore persisted partitions at startup (metadata partition first)
//! - Create and drop partitions on demand
//! - Tear down the store directory when this engine owns the metadata partition

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::{PersistenceType, StoreConfig};
use crate::error::{PartKvError, Result};
use crate::metrics::{self, MetricsSink};
use crate::partition::{self, PartitionConfig, PartitionFactory, StoragePartition};
use crate::store_dir::{FormatCheck, StoreDirectory, METADATA_PARTITION_ID};

type PartitionMap = HashMap<i32, Arc<dyn StoragePartition>>;

/// Lifecycle state of an engine
///
/// An engine is only handed out once it is `Open`; `Closed` and `Dropped`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Open,
    /// Shut down, data retained on disk
    Closed,
    /// Partitions (and possibly the store directory) deleted
    Dropped,
}

/// Storage engine for one store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Structural changes** (create/drop partition, drop, close): serialized
///   by `structure_lock`
///   - Only ONE structural change at a time
///   - Partition factories run while holding `structure_lock` only, so
///     lookups are not blocked by slow opens
///
/// - **Lookups** (partition/get/put/delete): concurrent
///   - Take the `partitions` read lock just long enough to clone an `Arc`
///   - A partition's own state is guarded by the partition itself
///
/// At most one engine may be open per store directory at a time; this is
/// not checked.
pub struct StoreStorageEngine {
    config: StoreConfig,

    store_dir: StoreDirectory,

    factory: Arc<dyn PartitionFactory>,

    /// partition id → open partition
    partitions: RwLock<PartitionMap>,

    state: RwLock<EngineState>,

    /// Serializes structural mutations of `partitions`
    structure_lock: Mutex<()>,

    metrics: Option<Arc<dyn MetricsSink>>,
}

impl StoreStorageEngine {
    /// Open the engine with the factory matching `config.persistence_type`
    pub fn open(config: StoreConfig) -> Result<Self> {
        let factory = partition::factory_for(config.persistence_type);
        Self::open_with(config, factory, None)
    }

    /// Open the engine with an explicit factory and metrics sink
    ///
    /// On startup:
    /// 1. Resolve and create the store directory
    /// 2. If it already existed, check the persisted table format and wipe
    ///    the directory on conflict
    /// 3. Restore partitions (metadata partition first)
    /// 4. Persist the engine config if this engine owns the metadata partition
    pub fn open_with(
        config: StoreConfig,
        factory: Arc<dyn PartitionFactory>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Result<Self> {
        // Step 1: Resolve and create the store directory
        let store_dir = StoreDirectory::resolve(&config.root_dir, &config.store_name)?;
        let created = store_dir.ensure_exists()?;

        // Step 2: Validate only when reopening
        if !created && config.validate_config_on_reopen {
            let check = store_dir.check_and_reconcile_format(config.table_format)?;
            if let FormatCheck::Wiped { persisted } = check {
                info!(
                    store = %config.store_name,
                    persisted = ?persisted,
                    configured = ?config.table_format,
                    "Store directory wiped after format conflict"
                );
            }
        }

        // Step 3: Restore partitions; nothing is visible until this returns
        let partitions = Self::restore(
            &store_dir,
            factory.as_ref(),
            &config,
            config.restore_metadata_partition,
            config.restore_data_partitions,
        )?;

        // Step 4: First writer wins; never overwritten
        if config.restore_metadata_partition {
            let persisted = config.persisted_engine_config();
            store_dir.persist_config_once(&persisted).map_err(|e| match e {
                PartKvError::Io(io) => PartKvError::init("unable to persist engine config", io),
                other => other,
            })?;
        }

        let engine = Self {
            config,
            store_dir,
            factory,
            partitions: RwLock::new(partitions),
            state: RwLock::new(EngineState::Open),
            structure_lock: Mutex::new(()),
            metrics,
        };
        engine.report_metrics();

        Ok(engine)
    }

    /// Open the partitions persisted for this store
    ///
    /// The metadata partition is opened before any data partition, and is
    /// created if `restore_metadata` is set and it is not on disk. Data
    /// partitions are opened on up to `restore_threads` workers.
    fn restore(
        store_dir: &StoreDirectory,
        factory: &dyn PartitionFactory,
        config: &StoreConfig,
        restore_metadata: bool,
        restore_data: bool,
    ) -> Result<PartitionMap> {
        let persisted_ids = factory.list_persisted_partition_ids(store_dir)?;
        let mut partitions = PartitionMap::new();

        if restore_metadata {
            if !persisted_ids.contains(&METADATA_PARTITION_ID) {
                info!(store = %config.store_name, "Metadata partition not found, creating it");
            }
            let metadata =
                factory.create_partition(store_dir, &config.partition_config(METADATA_PARTITION_ID))?;
            partitions.insert(METADATA_PARTITION_ID, metadata);
        }

        if restore_data {
            let data_ids: Vec<i32> = persisted_ids
                .iter()
                .copied()
                .filter(|&id| id != METADATA_PARTITION_ID)
                .collect();

            for (id, partition) in Self::open_data_partitions(store_dir, factory, config, &data_ids)? {
                partitions.insert(id, partition);
            }
        }

        info!(
            store = %config.store_name,
            persisted = persisted_ids.len(),
            restored = partitions.len(),
            "Restored store partitions"
        );
        Ok(partitions)
    }

    fn open_data_partitions(
        store_dir: &StoreDirectory,
        factory: &dyn PartitionFactory,
        config: &StoreConfig,
        ids: &[i32],
    ) -> Result<Vec<(i32, Arc<dyn StoragePartition>)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let open_chunk = |chunk: &[i32]| -> Result<Vec<(i32, Arc<dyn StoragePartition>)>> {
            chunk
                .iter()
                .map(|&id| {
                    factory
                        .create_partition(store_dir, &config.partition_config(id))
                        .map(|partition| (id, partition))
                        .inspect_err(|e| {
                            error!(store = %config.store_name, partition = id, error = %e, "Failed to restore partition")
                        })
                })
                .collect()
        };

        let threads = config.restore_threads.clamp(1, ids.len());
        if threads == 1 {
            return open_chunk(ids);
        }

        let chunk_size = ids.len().div_ceil(threads);
        let results = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = ids
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move |_| open_chunk(chunk)))
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

        let mut opened = Vec::with_capacity(ids.len());
        for result in results {
            opened.extend(result?);
        }
        Ok(opened)
    }

    // =========================================================================
    // Structural Operations
    // =========================================================================

    /// Create (or open) partition `partition_id` with the store's format
    pub fn create_partition(&self, partition_id: i32) -> Result<Arc<dyn StoragePartition>> {
        self.create_partition_with_config(self.config.partition_config(partition_id))
    }

    /// Create (or open) a partition from an explicit config
    ///
    /// Fails with `DuplicatePartition` if the id is already registered.
    pub fn create_partition_with_config(
        &self,
        config: PartitionConfig,
    ) -> Result<Arc<dyn StoragePartition>> {
        let partition = self.create_partition_locked(config)?;
        self.report_metrics();
        Ok(partition)
    }

    fn create_partition_locked(&self, config: PartitionConfig) -> Result<Arc<dyn StoragePartition>> {
        let _structure_guard = self.structure_lock.lock();
        self.check_open()?;

        if config.store_name != self.config.store_name {
            return Err(PartKvError::Config(format!(
                "partition config for store {:?} used with store {:?}",
                config.store_name, self.config.store_name
            )));
        }

        let partition_id = config.partition_id;
        if self.partitions.read().contains_key(&partition_id) {
            return Err(PartKvError::DuplicatePartition(partition_id));
        }

        let partition = self.factory.create_partition(&self.store_dir, &config)?;
        self.partitions
            .write()
            .insert(partition_id, Arc::clone(&partition));

        info!(store = %self.config.store_name, partition = partition_id, "Created partition");
        Ok(partition)
    }

    /// Delete the storage of partition `partition_id` and unregister it
    ///
    /// Unknown ids are a no-op. If the storage cannot be deleted the
    /// partition stays registered and usable.
    pub fn drop_partition(&self, partition_id: i32) -> Result<()> {
        if self.drop_partition_locked(partition_id)? {
            self.report_metrics();
        }
        Ok(())
    }

    fn drop_partition_locked(&self, partition_id: i32) -> Result<bool> {
        let _structure_guard = self.structure_lock.lock();
        self.check_open()?;

        let Some(partition) = self.partition(partition_id) else {
            info!(store = %self.config.store_name, partition = partition_id, "Partition not found, nothing to drop");
            return Ok(false);
        };

        partition.drop_storage()?;
        self.partitions.write().remove(&partition_id);
        info!(store = %self.config.store_name, partition = partition_id, "Dropped partition");
        Ok(true)
    }

    /// Drop every partition; if this engine owns the metadata partition the
    /// whole store directory is removed as well
    ///
    /// The engine is `Dropped` afterwards even if some storage could not be
    /// deleted; the first such error is returned.
    pub fn drop_store(&self) -> Result<()> {
        let structure_guard = self.structure_lock.lock();
        self.check_open()?;

        let drained: Vec<_> = self.partitions.write().drain().collect();
        let mut first_error = None;

        for (id, partition) in drained {
            if let Err(e) = partition.drop_storage() {
                warn!(store = %self.config.store_name, partition = id, error = %e, "Failed to drop partition");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        // Whoever controls the metadata partition removes the store folder
        if self.is_metadata_partition_owner() {
            info!(store = %self.config.store_name, path = %self.store_dir.path().display(), "Removing store directory");
            if let Err(e) = self.store_dir.remove_all() {
                warn!(store = %self.config.store_name, error = %e, "Failed to remove store directory");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        *self.state.write() = EngineState::Dropped;
        drop(structure_guard);
        self.report_metrics();

        first_error.map_or(Ok(()), Err)
    }

    /// Sync and release every partition; data stays on disk
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let _structure_guard = self.structure_lock.lock();
        match *self.state.read() {
            EngineState::Open => {}
            EngineState::Closed => return Ok(()),
            EngineState::Dropped => return Err(PartKvError::EngineDropped),
        }

        let drained: Vec<_> = self.partitions.write().drain().collect();
        let mut first_error = None;
        for (id, partition) in drained {
            if let Err(e) = partition.close() {
                warn!(store = %self.config.store_name, partition = id, error = %e, "Failed to close partition");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        *self.state.write() = EngineState::Closed;
        info!(store = %self.config.store_name, "Engine closed");

        first_error.map_or(Ok(()), Err)
    }

    // =========================================================================
    // Data Path
    // =========================================================================

    /// Open partition `partition_id`, if registered
    pub fn partition(&self, partition_id: i32) -> Option<Arc<dyn StoragePartition>> {
        self.partitions.read().get(&partition_id).cloned()
    }

    pub fn get(&self, partition_id: i32, key: &[u8]) -> Result<Option<Bytes>> {
        self.open_partition(partition_id)?.get(key)
    }

    pub fn put(&self, partition_id: i32, key: &[u8], value: &[u8]) -> Result<()> {
        self.open_partition(partition_id)?.put(key, value)
    }

    pub fn delete(&self, partition_id: i32, key: &[u8]) -> Result<()> {
        self.open_partition(partition_id)?.delete(key)
    }

    /// Sync every open partition
    pub fn sync(&self) -> Result<()> {
        self.check_open()?;
        let partitions: Vec<_> = self.partitions.read().values().cloned().collect();
        for partition in partitions {
            partition.sync()?;
        }
        Ok(())
    }

    fn open_partition(&self, partition_id: i32) -> Result<Arc<dyn StoragePartition>> {
        self.check_open()?;
        self.partition(partition_id)
            .ok_or(PartKvError::UnknownPartition(partition_id))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Recursive on-disk size of the store directory (0 if it is gone)
    pub fn size_in_bytes(&self) -> u64 {
        self.store_dir.size_in_bytes()
    }

    /// Partition ids found on disk for this store
    ///
    /// Still answers after `close`; fails once the store was dropped.
    pub fn list_persisted_partition_ids(&self) -> Result<BTreeSet<i32>> {
        if self.state() == EngineState::Dropped {
            return Err(PartKvError::EngineDropped);
        }
        self.factory.list_persisted_partition_ids(&self.store_dir)
    }

    /// Ids of the partitions currently open in this engine
    pub fn partition_ids(&self) -> BTreeSet<i32> {
        self.partitions.read().keys().copied().collect()
    }

    pub fn contains_partition(&self, partition_id: i32) -> bool {
        self.partitions.read().contains_key(&partition_id)
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }

    /// Whether this engine is responsible for the store directory
    pub fn is_metadata_partition_owner(&self) -> bool {
        self.config.restore_metadata_partition
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    pub fn store_name(&self) -> &str {
        &self.config.store_name
    }

    pub fn store_dir(&self) -> &Path {
        self.store_dir.path()
    }

    pub fn persistence_type(&self) -> PersistenceType {
        self.factory.kind()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_open(&self) -> Result<()> {
        match *self.state.read() {
            EngineState::Open => Ok(()),
            EngineState::Closed => Err(PartKvError::EngineNotOpen),
            EngineState::Dropped => Err(PartKvError::EngineDropped),
        }
    }

    /// Walks the store directory; call without holding `structure_lock`
    fn report_metrics(&self) {
        let sink = self.metrics.as_deref();
        if sink.is_none() {
            return;
        }
        let store = &self.config.store_name;
        metrics::report(sink, store, metrics::STORE_SIZE_BYTES, self.size_in_bytes());
        metrics::report(sink, store, metrics::STORE_PARTITION_COUNT, self.partition_count() as u64);
    }
}
