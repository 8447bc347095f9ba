//! Storage Module
//!
//! Immutable, sorted, fixed-record-size counts files.
//!
//! ## Responsibilities
//! - Persist counts in key order so lookups can binary search
//! - Carry the tx id / minor version that decides which file is live
//! - Remember which transactions were applied out of order
//! - Pick the live file out of the `.a`/`.b` pair on startup
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (2 records = 64 bytes)                                │
//! │   Magic "CNTS" | RecordSize u32 | Version u32 | Strays u32   │
//! │   LastTx u64 | Minor u64 | Records u64 | GapFreeTx u64       │
//! │   DataCRC u32 | HeaderCRC u32 | Padding                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Stray tx records (Strays × 32 bytes, type = TX_ID)           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Counts records (Records × 32 bytes, ascending key order)     │
//! │   type u8 | pad | f1 i32 | pad | f2 i32 | pad | f3 i32       │
//! │   value1 i64 | value2 i64                                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Trailing capacity (EMPTY records up to a page multiple)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod files;
mod iterator;
mod reader;
mod record;
mod writer;

use std::fs::File;
use std::io;

pub use files::{FileSelection, Slot, StoreFiles};
pub use iterator::DurableIterator;
pub use reader::{ConsistencyReport, CountsVisitor, DurableStore};
pub use record::{decode_record, encode_record, Record, RecordType};
pub use writer::{DurableWriter, WriterOptions};

// =============================================================================
// Shared Constants (used by writer, reader, iterator)
// =============================================================================

/// Magic bytes identifying a counts file
pub(crate) const MAGIC: &[u8; 4] = b"CNTS";

/// Current counts file format version
pub const FORMAT_VERSION: u32 = 1;

/// Every record, including the header slots, is this wide
pub const RECORD_SIZE: usize = 32;

/// Number of record slots the header occupies
pub const HEADER_RECORDS: usize = 2;

/// Header size in bytes
pub(crate) const HEADER_SIZE: usize = HEADER_RECORDS * RECORD_SIZE;

/// Bytes covered by the header checksum
pub(crate) const HEADER_CRC_OFFSET: usize = 52;

// =============================================================================
// Header
// =============================================================================

/// Metadata stored at the start of every counts file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub record_size: u32,
    pub format_version: u32,
    /// Transaction the file was rotated at
    pub last_committed_tx_id: u64,
    /// Tie-breaker between files with the same tx id
    pub minor_version: u64,
    /// Number of counts records (stray tx records not included)
    pub record_count: u64,
    /// Highest gap-free applied tx id when the file was written
    pub highest_gap_free_tx_id: u64,
    /// Number of stray tx records following the header
    pub stray_count: u32,
    /// CRC32 over stray + counts records
    pub data_crc: u32,
}

impl StoreHeader {
    /// `(tx id, minor version)` compared lexicographically; higher is newer
    pub fn version(&self) -> (u64, u64) {
        (self.last_committed_tx_id, self.minor_version)
    }

    /// Offset of the first counts record
    pub(crate) fn data_offset(&self) -> u64 {
        ((HEADER_RECORDS + self.stray_count as usize) * RECORD_SIZE) as u64
    }
}

// =============================================================================
// Positional reads
// =============================================================================

/// Read exactly `buf.len()` bytes at `offset` without touching a shared cursor,
/// so concurrent readers of an immutable file need no lock.
#[cfg(unix)]
pub(crate) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
pub(crate) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
