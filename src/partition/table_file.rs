//! Table File
//!
//! Checksummed file holding a partition's sorted key-value entries.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ Header (15 bytes)                                                   │
//! │   Magic: "PKVT" (4) | Version: u16 (2) | Format: u8 (1) | Count (8) │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                               │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                            │
//! │   ... repeated for each entry, in key order ...                    │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes)                                                    │
//! │   DataCRC: u32 (4) | Padding (4)                                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The format byte records the `TableFormat` the partition was created with.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::config::TableFormat;
use crate::error::{PartKvError, Result};

/// Magic bytes identifying a partkv table file
const MAGIC: &[u8; 4] = b"PKVT";

/// Current table file version
const VERSION: u16 = 1;

/// Magic (4) + Version (2) + Format (1) + EntryCount (8)
const HEADER_SIZE: usize = 15;

/// Offset of the entry count inside the header
const COUNT_OFFSET: u64 = 7;

/// DataCRC (4) + Padding (4)
const FOOTER_SIZE: usize = 8;

/// Writes a complete table file from entries given in key order
pub(crate) struct TableFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    entry_count: u64,
    /// Running CRC over the data block
    data_hasher: crc32fast::Hasher,
}

impl TableFileWriter {
    /// Create (or truncate) `path` and write the header
    pub fn create(path: &Path, format: TableFormat) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);

        // Entry count is patched in finish()
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&[format.as_byte()])?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            entry_count: 0,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Append one entry
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key_len = u32::try_from(key.len())
            .map_err(|_| PartKvError::Config(format!("key too large: {} bytes", key.len())))?;
        let val_len = u32::try_from(value.len())
            .map_err(|_| PartKvError::Config(format!("value too large: {} bytes", value.len())))?;

        let key_len_bytes = key_len.to_le_bytes();
        let val_len_bytes = val_len.to_le_bytes();

        for chunk in [&key_len_bytes[..], &val_len_bytes[..], key, value] {
            self.writer.write_all(chunk)?;
            self.data_hasher.update(chunk);
        }

        self.entry_count += 1;
        Ok(())
    }

    /// Write the footer, patch the entry count and fsync
    ///
    /// Returns the file size.
    pub fn finish(mut self) -> Result<u64> {
        let data_crc = self.data_hasher.finalize();
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&[0u8; 4])?;
        self.writer.flush()?;

        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| PartKvError::Io(e.into_error()))?;
        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();
        tracing::trace!(path = %self.path.display(), entries = self.entry_count, "Wrote table file");
        Ok(file_size)
    }
}

/// Write `entries` to `path` atomically (temp file + rename)
pub(crate) fn write_table<'a, I>(path: &Path, format: TableFormat, entries: I) -> Result<u64>
where
    I: IntoIterator<Item = (&'a Vec<u8>, &'a Bytes)>,
{
    let tmp_path = path.with_extension("tmp");
    let mut writer = TableFileWriter::create(&tmp_path, format)?;
    for (key, value) in entries {
        writer.add(key, value)?;
    }
    let size = writer.finish()?;
    fs::rename(&tmp_path, path)?;
    Ok(size)
}

/// Decoded contents of a table file
pub(crate) struct TableContents {
    pub format: TableFormat,
    pub entries: BTreeMap<Vec<u8>, Bytes>,
}

/// Read and verify a whole table file
pub(crate) fn read_table(path: &Path) -> Result<TableContents> {
    let data = fs::read(path)?;
    let corrupt = |what: &str| PartKvError::Corruption(format!("{}: {}", path.display(), what));

    if data.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(corrupt("file too short"));
    }
    if &data[0..4] != MAGIC {
        return Err(corrupt("bad magic"));
    }

    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != VERSION {
        return Err(corrupt(&format!("unsupported version {}", version)));
    }

    let format = TableFormat::from_byte(data[6]).ok_or_else(|| corrupt("unknown table format"))?;
    let entry_count = read_u64(&data[7..HEADER_SIZE]);

    let data_end = data.len() - FOOTER_SIZE;
    let block = Bytes::copy_from_slice(&data[HEADER_SIZE..data_end]);
    let expected_crc = read_u32(&data[data_end..data_end + 4]);
    if crc32fast::hash(&block) != expected_crc {
        return Err(corrupt("data checksum mismatch"));
    }

    // Values are sliced out of the shared block without copying
    let mut entries = BTreeMap::new();
    let mut pos = 0usize;
    while pos < block.len() {
        if pos + 8 > block.len() {
            return Err(corrupt("truncated entry header"));
        }
        let key_len = read_u32(&block[pos..pos + 4]) as usize;
        let val_len = read_u32(&block[pos + 4..pos + 8]) as usize;
        pos += 8;

        if pos + key_len + val_len > block.len() {
            return Err(corrupt("truncated entry"));
        }
        let key = block[pos..pos + key_len].to_vec();
        pos += key_len;
        let value = block.slice(pos..pos + val_len);
        pos += val_len;

        entries.insert(key, value);
    }

    if entries.len() as u64 != entry_count {
        return Err(corrupt("entry count mismatch"));
    }

    Ok(TableContents { format, entries })
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
