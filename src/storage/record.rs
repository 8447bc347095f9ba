//! Record codec
//!
//! Fixed-width encoding of counts records and the file header. All integers
//! are big-endian.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{CountsError, Result};
use crate::key::{CountsKey, CountsValue};

use super::{
    StoreHeader, FORMAT_VERSION, HEADER_CRC_OFFSET, HEADER_SIZE, MAGIC, RECORD_SIZE,
};

/// On-disk record type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Empty = 0,
    Node = 1,
    Relationship = 2,
    TxId = 3,
    IndexSize = 4,
    IndexSample = 5,
}

impl TryFrom<u8> for RecordType {
    type Error = CountsError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(RecordType::Empty),
            1 => Ok(RecordType::Node),
            2 => Ok(RecordType::Relationship),
            3 => Ok(RecordType::TxId),
            4 => Ok(RecordType::IndexSize),
            5 => Ok(RecordType::IndexSample),
            other => Err(CountsError::Storage(format!("Unknown record type: {}", other))),
        }
    }
}

/// A decoded record slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    /// Unused trailing capacity
    Empty,
    /// A counts entry
    Counts(CountsKey, CountsValue),
    /// A transaction applied out of order before the file was written
    TxId(u64),
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::Empty => RecordType::Empty,
            Record::TxId(_) => RecordType::TxId,
            Record::Counts(key, _) => match key {
                CountsKey::Node { .. } => RecordType::Node,
                CountsKey::Relationship { .. } => RecordType::Relationship,
                CountsKey::IndexSize { .. } => RecordType::IndexSize,
                CountsKey::IndexSample { .. } => RecordType::IndexSample,
            },
        }
    }
}

/// Append exactly `RECORD_SIZE` bytes for `record` to `buf`
pub fn encode_record(record: &Record, buf: &mut BytesMut) {
    let (f1, f2, f3, v1, v2) = match *record {
        Record::Empty => (0, 0, 0, 0, 0),
        Record::TxId(tx_id) => (0, 0, 0, tx_id as i64, 0),
        Record::Counts(key, value) => {
            let (f1, f2, f3) = match key {
                CountsKey::Node { label_id } => (0, 0, label_id),
                CountsKey::Relationship {
                    start_label_id,
                    type_id,
                    end_label_id,
                } => (start_label_id, type_id, end_label_id),
                CountsKey::IndexSize {
                    label_id,
                    property_key_id,
                }
                | CountsKey::IndexSample {
                    label_id,
                    property_key_id,
                } => (0, label_id, property_key_id),
            };
            (f1, f2, f3, value.first, value.second)
        }
    };

    buf.reserve(RECORD_SIZE);
    buf.put_u8(record.record_type() as u8);
    buf.put_u8(0);
    buf.put_i32(f1);
    buf.put_u8(0);
    buf.put_i32(f2);
    buf.put_u8(0);
    buf.put_i32(f3);
    buf.put_i64(v1);
    buf.put_i64(v2);
}

/// Decode one record slot. `bytes` must be `RECORD_SIZE` long.
pub fn decode_record(bytes: &[u8]) -> Result<Record> {
    if bytes.len() != RECORD_SIZE {
        return Err(CountsError::Storage(format!(
            "Record must be {} bytes, got {}",
            RECORD_SIZE,
            bytes.len()
        )));
    }

    let mut buf = bytes;
    let record_type = RecordType::try_from(buf.get_u8())?;
    buf.advance(1);
    let f1 = buf.get_i32();
    buf.advance(1);
    let f2 = buf.get_i32();
    buf.advance(1);
    let f3 = buf.get_i32();
    let v1 = buf.get_i64();
    let v2 = buf.get_i64();

    let record = match record_type {
        RecordType::Empty => {
            if bytes.iter().any(|b| *b != 0) {
                return Err(CountsError::Storage(
                    "Empty record with non-zero content".to_string(),
                ));
            }
            Record::Empty
        }
        RecordType::TxId => {
            if v1 <= 0 {
                return Err(CountsError::Storage(format!("Invalid stray tx id: {}", v1)));
            }
            Record::TxId(v1 as u64)
        }
        RecordType::Node => Record::Counts(CountsKey::node(f3), CountsValue::new(v1, v2)),
        RecordType::Relationship => {
            Record::Counts(CountsKey::relationship(f1, f2, f3), CountsValue::new(v1, v2))
        }
        RecordType::IndexSize => {
            Record::Counts(CountsKey::index_size(f2, f3), CountsValue::new(v1, v2))
        }
        RecordType::IndexSample => {
            Record::Counts(CountsKey::index_sample(f2, f3), CountsValue::new(v1, v2))
        }
    };
    Ok(record)
}

/// Encode the header slots, computing the header checksum
pub(crate) fn encode_header(header: &StoreHeader) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE);
    buf.put_slice(MAGIC);
    buf.put_u32(header.record_size);
    buf.put_u32(header.format_version);
    buf.put_u32(header.stray_count);
    buf.put_u64(header.last_committed_tx_id);
    buf.put_u64(header.minor_version);
    buf.put_u64(header.record_count);
    buf.put_u64(header.highest_gap_free_tx_id);
    buf.put_u32(header.data_crc);
    debug_assert_eq!(buf.len(), HEADER_CRC_OFFSET);

    let header_crc = crc32fast::hash(&buf[..HEADER_CRC_OFFSET]);
    buf.put_u32(header_crc);
    buf.resize(HEADER_SIZE, 0);
    buf
}

/// Decode and validate the header slots
pub(crate) fn decode_header(bytes: &[u8]) -> Result<StoreHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(CountsError::Storage(format!(
            "Header must be {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }
    if &bytes[0..4] != MAGIC {
        return Err(CountsError::Storage(format!(
            "Invalid magic: expected CNTS, got {:?}",
            &bytes[0..4]
        )));
    }

    let mut buf = &bytes[4..];
    let record_size = buf.get_u32();
    let format_version = buf.get_u32();
    let stray_count = buf.get_u32();
    let last_committed_tx_id = buf.get_u64();
    let minor_version = buf.get_u64();
    let record_count = buf.get_u64();
    let highest_gap_free_tx_id = buf.get_u64();
    let data_crc = buf.get_u32();
    let stored_crc = buf.get_u32();

    let computed_crc = crc32fast::hash(&bytes[..HEADER_CRC_OFFSET]);
    if stored_crc != computed_crc {
        return Err(CountsError::Storage(format!(
            "Header checksum mismatch: expected {:#010x}, got {:#010x}",
            stored_crc, computed_crc
        )));
    }
    if record_size as usize != RECORD_SIZE {
        return Err(CountsError::Storage(format!(
            "Unsupported record size: {}",
            record_size
        )));
    }
    if format_version != FORMAT_VERSION {
        return Err(CountsError::Storage(format!(
            "Unsupported format version: {}",
            format_version
        )));
    }

    Ok(StoreHeader {
        record_size,
        format_version,
        last_committed_tx_id,
        minor_version,
        record_count,
        highest_gap_free_tx_id,
        stray_count,
        data_crc,
    })
}
