//! Counts file reader
//!
//! Opens a counts file, validates its structure and serves O(log n) lookups
//! by binary search over the fixed-width record region. The file never
//! changes after it is published, so reads use positional I/O and take no
//! lock.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{CountsError, Result};
use crate::key::{CountsKey, CountsValue};

use super::iterator::DurableIterator;
use super::record::{decode_header, decode_record, Record};
use super::writer::{DurableWriter, WriterOptions};
use super::{read_exact_at, StoreHeader, HEADER_RECORDS, HEADER_SIZE, RECORD_SIZE};

/// Records validated per read while opening
const VALIDATION_CHUNK_RECORDS: usize = 256;

/// Receives counts in ascending key order
pub trait CountsVisitor {
    fn visit(&mut self, key: CountsKey, value: CountsValue);
}

impl<F> CountsVisitor for F
where
    F: FnMut(CountsKey, CountsValue),
{
    fn visit(&mut self, key: CountsKey, value: CountsValue) {
        self(key, value)
    }
}

/// Result of a structural check over a counts file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub records_checked: u64,
    pub issues: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// An open, immutable counts file
#[derive(Debug)]
pub struct DurableStore {
    path: PathBuf,
    file: File,
    header: StoreHeader,
    stray_tx_ids: Vec<u64>,
}

impl DurableStore {
    /// Open and validate a counts file
    ///
    /// Any structural problem is reported as `CountsError::Corruption`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let corrupt = |reason: String| CountsError::corruption(path, reason);

        if file_len < HEADER_SIZE as u64 {
            return Err(corrupt(format!("file is truncated ({} bytes)", file_len)));
        }
        if file_len % RECORD_SIZE as u64 != 0 {
            return Err(corrupt(format!(
                "file length {} is not a multiple of the record size",
                file_len
            )));
        }

        let mut header_bytes = [0u8; HEADER_SIZE];
        read_exact_at(&file, &mut header_bytes, 0)?;
        let header = decode_header(&header_bytes).map_err(|e| corrupt(e.to_string()))?;

        let total_slots = file_len / RECORD_SIZE as u64;
        let used_slots =
            HEADER_RECORDS as u64 + header.stray_count as u64 + header.record_count;
        if used_slots > total_slots {
            return Err(corrupt(format!(
                "header claims {} records but the file holds {}",
                used_slots, total_slots
            )));
        }

        let mut store = Self {
            path: path.to_path_buf(),
            file,
            header,
            stray_tx_ids: Vec::with_capacity(header.stray_count as usize),
        };
        store.validate(total_slots)?;

        tracing::debug!(
            file = %store.path.display(),
            tx_id = header.last_committed_tx_id,
            minor_version = header.minor_version,
            records = header.record_count,
            "Opened counts file"
        );
        Ok(store)
    }

    /// Write an empty counts file with the given header values and open it
    pub fn create_empty(path: &Path, options: WriterOptions) -> Result<Self> {
        DurableWriter::create(path, options)?.finish()?;
        Self::open(path)
    }

    /// Start a writer for a new file; the writer is independent of this store
    pub fn new_writer(target: &Path, options: WriterOptions) -> Result<DurableWriter> {
        DurableWriter::create(target, options)
    }

    /// Check checksums and record types, collecting stray tx ids
    fn validate(&mut self, total_slots: u64) -> Result<()> {
        let corrupt = |reason: String| CountsError::corruption(&self.path, reason);
        let stray_count = self.header.stray_count as u64;
        let region_slots = stray_count + self.header.record_count;

        let mut hasher = crc32fast::Hasher::new();
        let mut buffer = vec![0u8; VALIDATION_CHUNK_RECORDS * RECORD_SIZE];
        let mut slot = 0u64;
        let mut strays = Vec::with_capacity(stray_count as usize);

        while slot < region_slots {
            let n = (region_slots - slot).min(VALIDATION_CHUNK_RECORDS as u64) as usize;
            let chunk = &mut buffer[..n * RECORD_SIZE];
            let offset = (HEADER_RECORDS as u64 + slot) * RECORD_SIZE as u64;
            read_exact_at(&self.file, chunk, offset)?;
            hasher.update(chunk);

            for (i, bytes) in chunk.chunks_exact(RECORD_SIZE).enumerate() {
                let index = slot + i as u64;
                let record = decode_record(bytes)
                    .map_err(|e| corrupt(format!("record {}: {}", index, e)))?;
                match (index < stray_count, record) {
                    (true, Record::TxId(tx_id)) => strays.push(tx_id),
                    (false, Record::Counts(..)) => {}
                    (_, other) => {
                        return Err(corrupt(format!(
                            "unexpected {:?} record at slot {}",
                            other.record_type(),
                            index
                        )))
                    }
                }
            }
            slot += n as u64;
        }

        let data_crc = hasher.finalize();
        if data_crc != self.header.data_crc {
            return Err(corrupt(format!(
                "data checksum mismatch: expected {:#010x}, got {:#010x}",
                self.header.data_crc, data_crc
            )));
        }

        // Trailing capacity must be empty
        let mut slot = HEADER_RECORDS as u64 + region_slots;
        while slot < total_slots {
            let n = (total_slots - slot).min(VALIDATION_CHUNK_RECORDS as u64) as usize;
            let chunk = &mut buffer[..n * RECORD_SIZE];
            read_exact_at(&self.file, chunk, slot * RECORD_SIZE as u64)?;
            if chunk.iter().any(|b| *b != 0) {
                return Err(corrupt(format!(
                    "non-empty record in trailing capacity near slot {}",
                    slot
                )));
            }
            slot += n as u64;
        }

        self.stray_tx_ids = strays;
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Get the stored value for `key`, or zero if absent
    pub fn get(&self, key: &CountsKey) -> Result<CountsValue> {
        let mut low = 0u64;
        let mut high = self.header.record_count;

        while low < high {
            let mid = low + (high - low) / 2;
            let (candidate, value) = match self.read_slot(mid)? {
                Record::Counts(k, v) => (k, v),
                other => {
                    return Err(CountsError::corruption(
                        &self.path,
                        format!("unexpected {:?} record at index {}", other.record_type(), mid),
                    ))
                }
            };
            match candidate.cmp(key) {
                std::cmp::Ordering::Equal => return Ok(value),
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
            }
        }
        Ok(CountsValue::ZERO)
    }

    /// Decode the counts record at `index` within the record region
    fn read_slot(&self, index: u64) -> Result<Record> {
        let mut bytes = [0u8; RECORD_SIZE];
        let offset = self.header.data_offset() + index * RECORD_SIZE as u64;
        read_exact_at(&self.file, &mut bytes, offset)?;
        decode_record(&bytes)
    }

    /// Iterate over every stored entry in ascending key order
    pub fn iter(&self) -> DurableIterator<'_> {
        DurableIterator::new(self)
    }

    /// Stream every stored entry, in ascending key order, to `visitor`
    pub fn accept<V: CountsVisitor + ?Sized>(&self, visitor: &mut V) -> Result<()> {
        for entry in self.iter() {
            let (key, value) = entry?;
            visitor.visit(key, value);
        }
        Ok(())
    }

    /// Check ordering and value invariants that opening does not
    pub fn consistency_check(&self) -> Result<ConsistencyReport> {
        let mut report = ConsistencyReport::default();
        let mut previous: Option<CountsKey> = None;

        for entry in self.iter() {
            let (key, value) = entry?;
            if let Some(prev) = previous {
                if key == prev {
                    report.issues.push(format!("duplicate key {}", key));
                } else if key < prev {
                    report.issues.push(format!("key {} sorts before {}", key, prev));
                }
            }
            if value.is_zero() {
                report.issues.push(format!("zero-valued record for {}", key));
            }
            previous = Some(key);
            report.records_checked += 1;
        }

        if report.records_checked != self.header.record_count {
            report.issues.push(format!(
                "header claims {} records, scan found {}",
                self.header.record_count, report.records_checked
            ));
        }
        for tx_id in &self.stray_tx_ids {
            if *tx_id <= self.header.highest_gap_free_tx_id {
                report.issues.push(format!(
                    "stray tx {} is not above the gap-free tx {}",
                    tx_id, self.header.highest_gap_free_tx_id
                ));
            }
        }
        Ok(report)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    pub fn tx_id(&self) -> u64 {
        self.header.last_committed_tx_id
    }

    pub fn minor_version(&self) -> u64 {
        self.header.minor_version
    }

    pub fn record_count(&self) -> u64 {
        self.header.record_count
    }

    /// Transactions applied above the gap-free watermark when written
    pub fn stray_tx_ids(&self) -> &[u64] {
        &self.stray_tx_ids
    }

    pub(super) fn file(&self) -> &File {
        &self.file
    }
}
