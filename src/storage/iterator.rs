//! Counts file iterator
//!
//! Sequential iteration over all counts records, reading a chunk of records
//! at a time with positional reads.

use crate::error::{CountsError, Result};
use crate::key::{CountsKey, CountsValue};

use super::reader::DurableStore;
use super::record::{decode_record, Record};
use super::{read_exact_at, RECORD_SIZE};

/// Records fetched per read
const CHUNK_RECORDS: usize = 256;

/// Iterator over counts entries in ascending key order
pub struct DurableIterator<'a> {
    store: &'a DurableStore,
    /// Index of the next record to yield
    next: u64,
    /// One past the last counts record
    end: u64,
    /// Buffered records and the index of the first one
    buffer: Vec<u8>,
    buffer_start: u64,
    buffer_records: usize,
    done: bool,
}

impl<'a> DurableIterator<'a> {
    pub(super) fn new(store: &'a DurableStore) -> Self {
        Self {
            store,
            next: 0,
            end: store.record_count(),
            buffer: vec![0u8; CHUNK_RECORDS * RECORD_SIZE],
            buffer_start: 0,
            buffer_records: 0,
            done: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        let n = (self.end - self.next).min(CHUNK_RECORDS as u64) as usize;
        let offset = self.store.header().data_offset() + self.next * RECORD_SIZE as u64;
        read_exact_at(self.store.file(), &mut self.buffer[..n * RECORD_SIZE], offset)?;
        self.buffer_start = self.next;
        self.buffer_records = n;
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<(CountsKey, CountsValue)>> {
        if self.next >= self.end {
            return Ok(None);
        }
        if self.next >= self.buffer_start + self.buffer_records as u64 {
            self.fill()?;
        }

        let at = (self.next - self.buffer_start) as usize * RECORD_SIZE;
        let record = decode_record(&self.buffer[at..at + RECORD_SIZE])?;
        self.next += 1;

        match record {
            Record::Counts(key, value) => Ok(Some((key, value))),
            // Unused capacity ends the scan
            Record::Empty => Ok(None),
            Record::TxId(tx_id) => Err(CountsError::corruption(
                self.store.path(),
                format!("stray tx record {} inside the counts region", tx_id),
            )),
        }
    }
}

impl<'a> Iterator for DurableIterator<'a> {
    type Item = Result<(CountsKey, CountsValue)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
