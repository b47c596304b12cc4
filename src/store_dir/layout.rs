//! On-disk naming for store and partition directories.
//!
//! ```text
//! {root}/{store}/{store}_{partition_id}
//! ```
//!
//! The partition directory name must parse back to exactly the id it was
//! built from, including the negative metadata partition id.

use std::path::{Path, PathBuf};

use crate::error::{PartKvError, Result};

/// Reserved id of the partition holding store-level metadata
pub const METADATA_PARTITION_ID: i32 = -1;

const SEPARATOR: char = '_';

/// `{root}/{store}`
pub fn compose_store_dir(root: &Path, store_name: &str) -> PathBuf {
    root.join(store_name)
}

/// `{store}_{partition_id}`
pub fn partition_dir_name(store_name: &str, partition_id: i32) -> String {
    format!("{}{}{}", store_name, SEPARATOR, partition_id)
}

/// `{root}/{store}/{store}_{partition_id}`
pub fn compose_partition_dir(root: &Path, store_name: &str, partition_id: i32) -> PathBuf {
    compose_store_dir(root, store_name).join(partition_dir_name(store_name, partition_id))
}

/// Parse a partition id from a directory name belonging to `store_name`
/// "userProfiles_-1" → Some(-1)
///
/// Names for other stores, stray files and non-canonical numbers
/// ("userProfiles_007", "userProfiles_+1") yield `None`.
pub fn parse_partition_id(store_name: &str, dir_name: &str) -> Option<i32> {
    let id_str = dir_name
        .strip_prefix(store_name)?
        .strip_prefix(SEPARATOR)?;
    let id: i32 = id_str.parse().ok()?;

    // Only accept the exact spelling partition_dir_name would produce
    if id.to_string() != id_str {
        return None;
    }
    Some(id)
}

/// Reject store names that cannot be used as a single directory component
pub fn validate_store_name(store_name: &str) -> Result<()> {
    let invalid = store_name.is_empty()
        || store_name == "."
        || store_name == ".."
        || store_name.contains(['/', '\\', '\0']);

    if invalid {
        return Err(PartKvError::Config(format!(
            "invalid store name {:?}",
            store_name
        )));
    }
    Ok(())
}
