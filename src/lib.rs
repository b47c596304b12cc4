//! # partkv
//!
//! Partition lifecycle and physical-format consistency for a partitioned
//! key-value store:
//! - One engine per logical store, one directory per partition
//! - Reserved metadata partition (id -1) records the store's table format
//! - Format conflicts on reopen wipe and rebuild the store directory
//! - Single-writer/multi-reader partition registry
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   StoreStorageEngine                        │
//! │      restore · create/drop partition · drop · size          │
//! └───────────┬──────────────────────────────────┬──────────────┘
//!             │                                  │
//!             ▼                                  ▼
//!   ┌───────────────────┐              ┌───────────────────┐
//!   │  StoreDirectory   │              │ PartitionFactory  │
//!   │ (format guard,    │              │  Table | InMemory │
//!   │  engineConfig)    │              └─────────┬─────────┘
//!   └───────────────────┘                        │
//!                                                ▼
//!                                      ┌───────────────────┐
//!                                      │ StoragePartition  │
//!                                      │  (table file)     │
//!                                      └───────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod metrics;

pub mod store_dir;
pub mod partition;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{PartKvError, Result};
pub use config::{PersistenceType, StoreConfig, TableFormat};
pub use engine::{EngineState, StoreStorageEngine};
pub use store_dir::METADATA_PARTITION_ID;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of partkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
