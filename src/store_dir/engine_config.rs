//! Persisted engine config
//!
//! Flat `key=value` text record written once under the metadata partition.
//! It records the physical format the store was created with so a later
//! open with a different format can be detected.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use crate::config::TableFormat;
use crate::error::Result;

/// Key of the table format flag
pub const PLAIN_TABLE_FORMAT_KEY: &str = "storage.plain.table.format.enabled";

/// Flat key → value engine config record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEngineConfig {
    entries: BTreeMap<String, String>,
}

impl PersistedEngineConfig {
    /// Record containing only the table format flag
    pub fn new(format: TableFormat) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            PLAIN_TABLE_FORMAT_KEY.to_string(),
            format.is_plain_table().to_string(),
        );
        Self { entries }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Table format recorded in this config
    ///
    /// `None` if the flag is missing or not a boolean.
    pub fn table_format(&self) -> Option<TableFormat> {
        let flag = self.get(PLAIN_TABLE_FORMAT_KEY)?.trim().parse::<bool>().ok()?;
        Some(TableFormat::from_plain_table_flag(flag))
    }

    /// Serialize as `key=value` lines
    pub fn to_properties(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Parse `key=value` lines; blank lines and `#` comments are skipped
    ///
    /// Returns `None` for anything that is not a well-formed record, so a
    /// torn write reads the same as a missing file.
    pub fn parse(text: &str) -> Option<Self> {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            entries.insert(key.to_string(), value.trim().to_string());
        }

        let config = Self { entries };
        // A record without a readable format flag cannot be verified against
        config.table_format()?;
        Some(config)
    }

    /// Read the record at `path`
    ///
    /// Missing or unparseable files yield `Ok(None)`.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            // Non UTF-8 content is a torn/garbage file
            Err(e) if e.kind() == io::ErrorKind::InvalidData => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Self::parse(&text))
    }

    /// Write the record to `path` via a temp file + rename
    pub fn write(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(self.to_properties().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl fmt::Display for PersistedEngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{{{}}}", pairs.join(", "))
    }
}
