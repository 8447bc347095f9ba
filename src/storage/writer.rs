//! Counts file writer
//!
//! Writes sorted counts records to a temporary sibling of the target file and
//! renames it into place on `finish()`, so a crash mid-write never leaves a
//! half-written file under the target name.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;

use crate::error::{CountsError, Result};
use crate::key::{CountsKey, CountsValue};

use super::record::{encode_header, encode_record, Record};
use super::{StoreHeader, FORMAT_VERSION, HEADER_RECORDS, HEADER_SIZE, RECORD_SIZE};

/// Header values for a file about to be written
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub last_committed_tx_id: u64,
    pub minor_version: u64,
    pub highest_gap_free_tx_id: u64,
    /// Transactions applied above the gap-free watermark
    pub stray_tx_ids: Vec<u64>,
    /// Pad the file with empty records up to a multiple of this
    pub records_per_page: usize,
}

impl WriterOptions {
    pub fn new(last_committed_tx_id: u64, minor_version: u64) -> Self {
        Self {
            last_committed_tx_id,
            minor_version,
            highest_gap_free_tx_id: last_committed_tx_id,
            stray_tx_ids: Vec::new(),
            records_per_page: 1,
        }
    }
}

/// Builder for a new counts file from entries in ascending key order
pub struct DurableWriter {
    /// Final file path
    target: PathBuf,
    /// Path written to until `finish()`
    temp: PathBuf,
    /// Buffered writer, taken on finish
    writer: Option<BufWriter<File>>,
    options: WriterOptions,
    /// Number of counts records written
    record_count: u64,
    /// Last key written, for order checking
    last_key: Option<CountsKey>,
    /// Running CRC over stray + counts records
    data_hasher: crc32fast::Hasher,
    /// Scratch buffer for one record
    scratch: BytesMut,
    /// Set once the file is renamed into place
    published: bool,
}

impl DurableWriter {
    /// Create a writer for `target`
    ///
    /// Writes a zeroed header placeholder and the stray tx records
    /// immediately; call `add()` in ascending key order, then `finish()`.
    pub fn create(target: &Path, mut options: WriterOptions) -> Result<Self> {
        if let Some(tx_id) = options
            .stray_tx_ids
            .iter()
            .find(|id| **id == 0 || i64::try_from(**id).is_err())
        {
            return Err(CountsError::Storage(format!(
                "Stray tx id out of range: {}",
                tx_id
            )));
        }

        let temp = temp_path(target);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&[0u8; HEADER_SIZE])?;

        options.stray_tx_ids.sort_unstable();
        options.stray_tx_ids.dedup();

        let mut this = Self {
            target: target.to_path_buf(),
            temp,
            writer: Some(writer),
            options,
            record_count: 0,
            last_key: None,
            data_hasher: crc32fast::Hasher::new(),
            scratch: BytesMut::with_capacity(RECORD_SIZE),
            published: false,
        };

        let strays = this.options.stray_tx_ids.clone();
        for tx_id in strays {
            this.write_record(&Record::TxId(tx_id))?;
        }
        Ok(this)
    }

    /// Add an entry (keys must be strictly ascending)
    pub fn add(&mut self, key: CountsKey, value: CountsValue) -> Result<()> {
        if let Some(last) = self.last_key {
            if key <= last {
                return Err(CountsError::Storage(format!(
                    "Keys must be written in strictly ascending order: {} after {}",
                    key, last
                )));
            }
        }
        self.write_record(&Record::Counts(key, value))?;
        self.last_key = Some(key);
        self.record_count += 1;
        Ok(())
    }

    /// Number of counts records added so far
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    fn write_record(&mut self, record: &Record) -> Result<()> {
        self.scratch.clear();
        encode_record(record, &mut self.scratch);
        self.data_hasher.update(&self.scratch);
        match self.writer.as_mut() {
            Some(writer) => writer.write_all(&self.scratch)?,
            None => return Err(CountsError::Storage("Writer already finished".to_string())),
        }
        Ok(())
    }

    /// Pad, write the final header, sync and publish under the target name
    pub fn finish(mut self) -> Result<StoreHeader> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| CountsError::Storage("Writer already finished".to_string()))?;

        let stray_count = self.options.stray_tx_ids.len();
        let used = HEADER_RECORDS + stray_count + self.record_count as usize;
        let per_page = self.options.records_per_page.max(1);
        let total = used.div_ceil(per_page) * per_page;
        let padding = vec![0u8; (total - used) * RECORD_SIZE];
        writer.write_all(&padding)?;

        let header = StoreHeader {
            record_size: RECORD_SIZE as u32,
            format_version: FORMAT_VERSION,
            last_committed_tx_id: self.options.last_committed_tx_id,
            minor_version: self.options.minor_version,
            record_count: self.record_count,
            highest_gap_free_tx_id: self.options.highest_gap_free_tx_id,
            stray_count: stray_count as u32,
            data_crc: self.data_hasher.clone().finalize(),
        };

        writer.flush()?;
        let mut file = writer.into_inner().map_err(|e| {
            CountsError::Storage(format!("Failed to flush counts file: {}", e))
        })?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&encode_header(&header))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp, &self.target)?;
        self.published = true;
        sync_parent_dir(&self.target);

        tracing::debug!(
            file = %self.target.display(),
            tx_id = header.last_committed_tx_id,
            minor_version = header.minor_version,
            records = header.record_count,
            strays = header.stray_count,
            "Wrote counts file"
        );
        Ok(header)
    }
}

impl Drop for DurableWriter {
    fn drop(&mut self) {
        // Unfinished writes never become visible under the target name
        if !self.published {
            self.writer.take();
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// `<target>.tmp`
pub(crate) fn temp_path(target: &Path) -> PathBuf {
    let mut name: OsString = target.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
