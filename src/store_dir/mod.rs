//! Store Directory Module
//!
//! Owns the on-disk directory of one store and guards its physical format.
//!
//! ## Responsibilities
//! - Resolve `{root}/{store}` and create it when missing
//! - Compare the persisted table format against the configured one and
//!   wipe the directory tree on mismatch
//! - Persist the engine config at most once per directory lifetime
//! - Discover partition ids and measure on-disk size
//!
//! ## Layout
//! ```text
//! {root}/{store}/
//!   ├── {store}_-1/
//!   │     └── engineConfig     (key=value, written once)
//!   ├── {store}_0/
//!   └── {store}_1/
//! ```

mod engine_config;
pub mod layout;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::TableFormat;
use crate::error::{PartKvError, Result};

pub use engine_config::{PersistedEngineConfig, PLAIN_TABLE_FORMAT_KEY};
pub use layout::METADATA_PARTITION_ID;

/// Outcome of the format check performed when reopening a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCheck {
    /// Persisted format equals the configured one
    Matched,

    /// No readable persisted config; nothing to compare against
    Unverified,

    /// Persisted format differed; the directory was wiped and recreated
    Wiped { persisted: TableFormat },
}

/// A store's directory on local disk
#[derive(Debug, Clone)]
pub struct StoreDirectory {
    /// Parent of every store directory on this node
    root: PathBuf,

    store_name: String,

    /// `{root}/{store_name}`
    path: PathBuf,
}

impl StoreDirectory {
    /// File holding the persisted engine config, inside the metadata partition
    pub const ENGINE_CONFIG_FILENAME: &'static str = "engineConfig";

    /// Resolve the directory for `store_name` under `root` (no I/O)
    pub fn resolve(root: &Path, store_name: &str) -> Result<Self> {
        layout::validate_store_name(store_name)?;

        Ok(Self {
            root: root.to_path_buf(),
            store_name: store_name.to_string(),
            path: layout::compose_store_dir(root, store_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Directory of `partition_id` inside this store
    pub fn partition_dir(&self, partition_id: i32) -> PathBuf {
        layout::compose_partition_dir(&self.root, &self.store_name, partition_id)
    }

    pub fn engine_config_path(&self) -> PathBuf {
        self.partition_dir(METADATA_PARTITION_ID)
            .join(Self::ENGINE_CONFIG_FILENAME)
    }

    /// Create the directory tree if absent
    ///
    /// Returns `true` if it had to be created.
    pub fn ensure_exists(&self) -> Result<bool> {
        if self.path.exists() {
            if !self.path.is_dir() {
                return Err(PartKvError::NotADirectory(self.path.clone()));
            }
            return Ok(false);
        }

        fs::create_dir_all(&self.path).map_err(|e| {
            PartKvError::init(
                format!("failed to create store dir {}", self.path.display()),
                e,
            )
        })?;
        info!(store = %self.store_name, path = %self.path.display(), "Created store directory");
        Ok(true)
    }

    /// Read the persisted engine config, if there is a readable one
    pub fn read_engine_config(&self) -> Result<Option<PersistedEngineConfig>> {
        PersistedEngineConfig::read(&self.engine_config_path())
    }

    /// Check the persisted table format against `configured`
    ///
    /// On mismatch the whole store directory is deleted and recreated empty.
    /// A missing or unreadable config skips the check.
    pub fn check_and_reconcile_format(&self, configured: TableFormat) -> Result<FormatCheck> {
        let config_path = self.engine_config_path();

        let persisted = self.read_engine_config().map_err(|e| match e {
            PartKvError::Io(io) => PartKvError::init(
                format!("failed to read engine config {}", config_path.display()),
                io,
            ),
            other => other,
        })?;

        let persisted = match persisted {
            Some(config) => config,
            None => {
                warn!(
                    store = %self.store_name,
                    path = %config_path.display(),
                    "Engine config not found, skipping format validation"
                );
                return Ok(FormatCheck::Unverified);
            }
        };

        info!(store = %self.store_name, config = %persisted, "Found persisted engine config");

        let Some(persisted_format) = persisted.table_format() else {
            return Ok(FormatCheck::Unverified);
        };

        if persisted_format == configured {
            return Ok(FormatCheck::Matched);
        }

        warn!(
            store = %self.store_name,
            existing = ?persisted_format,
            requested = ?configured,
            "Table format conflict, removing and recreating store directory"
        );
        self.wipe()?;

        Ok(FormatCheck::Wiped {
            persisted: persisted_format,
        })
    }

    /// Delete the directory tree and recreate it empty
    fn wipe(&self) -> Result<()> {
        info!(path = %self.path.display(), "Removing store directory");
        fs::remove_dir_all(&self.path).map_err(|e| {
            PartKvError::init(
                format!("failed to remove store dir {}", self.path.display()),
                e,
            )
        })?;
        fs::create_dir_all(&self.path).map_err(|e| {
            PartKvError::init(
                format!("failed to recreate store dir {}", self.path.display()),
                e,
            )
        })?;
        Ok(())
    }

    /// Write `config` under the metadata partition unless a config file
    /// already exists there
    ///
    /// Returns `true` if this call wrote the file. An existing file is never
    /// overwritten, even if it is unreadable.
    pub fn persist_config_once(&self, config: &PersistedEngineConfig) -> Result<bool> {
        let config_path = self.engine_config_path();
        if config_path.exists() {
            warn!(
                store = %self.store_name,
                path = %config_path.display(),
                "Engine config already exists, skipping persist"
            );
            return Ok(false);
        }

        fs::create_dir_all(self.partition_dir(METADATA_PARTITION_ID))?;
        config.write(&config_path)?;
        info!(store = %self.store_name, config = %config, "Persisted engine config");
        Ok(true)
    }

    /// Partition ids present on disk
    ///
    /// Entries that do not parse as a partition directory of this store are
    /// ignored. A missing store directory yields an empty set.
    pub fn list_persisted_partition_ids(&self) -> Result<BTreeSet<i32>> {
        let mut ids = BTreeSet::new();

        if !self.path.exists() {
            info!(path = %self.path.display(), "Store dir doesn't exist");
            return Ok(ids);
        }
        if !self.path.is_dir() {
            return Err(PartKvError::NotADirectory(self.path.clone()));
        }

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if !entry.file_type()?.is_dir() {
                debug!(entry = %name, "Ignoring non-directory entry in store dir");
                continue;
            }

            match layout::parse_partition_id(&self.store_name, &name) {
                Some(id) => {
                    ids.insert(id);
                }
                None => debug!(entry = %name, "Ignoring unrecognized entry in store dir"),
            }
        }

        Ok(ids)
    }

    /// Total size of all files under the store directory
    ///
    /// 0 if the directory does not exist; never fails.
    pub fn size_in_bytes(&self) -> u64 {
        dir_size(&self.path)
    }

    /// Remove the whole directory tree
    ///
    /// Returns `false` if there was nothing to remove.
    pub fn remove_all(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&self.path)?;
        Ok(true)
    }
}

/// Recursive size of regular files under `path` (symlinks not followed)
///
/// Entries that vanish or cannot be read while walking count as 0.
pub(crate) fn dir_size(path: &Path) -> u64 {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(_) => return 0,
    };

    if metadata.is_file() {
        return metadata.len();
    }
    if !metadata.is_dir() {
        return 0;
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Skipping unreadable directory");
            return 0;
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| dir_size(&entry.path()))
        .sum()
}
