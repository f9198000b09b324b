//! On-disk encoding of committed log entries
//!
//! Record layout:
//! - Record Length (u32 LE), total length including this field
//! - Log Index (u64 LE)
//! - Payload (variable)
//! - Checksum (u32 LE) over length + index + payload

use std::io;

use super::checksum::compute_checksum;
use crate::consensus::{LogEntry, LogIndex};

/// Fixed framing overhead: length + index + checksum
pub const RECORD_OVERHEAD: usize = 4 + 8 + 4;

impl LogEntry {
    /// Serialize the entry into a self-checking record.
    pub fn serialize(&self) -> Vec<u8> {
        let record_length = (RECORD_OVERHEAD + self.payload.len()) as u32;

        let mut record = Vec::with_capacity(record_length as usize);
        record.extend_from_slice(&record_length.to_le_bytes());
        record.extend_from_slice(&self.index.value().to_le_bytes());
        record.extend_from_slice(&self.payload);

        let checksum = compute_checksum(&record);
        record.extend_from_slice(&checksum.to_le_bytes());

        record
    }

    /// Deserialize a record from bytes, verifying its checksum.
    ///
    /// Returns the entry and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < RECORD_OVERHEAD {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Record too short",
            ));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

        if record_length < RECORD_OVERHEAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record length: {}", record_length),
            ));
        }

        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let stored_checksum = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed_checksum = compute_checksum(&data[..checksum_offset]);

        if computed_checksum != stored_checksum {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed_checksum, stored_checksum
                ),
            ));
        }

        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&data[4..12]);
        let index = LogIndex::new(u64::from_le_bytes(index_bytes));

        Ok((
            LogEntry {
                index,
                payload: data[12..checksum_offset].to_vec(),
            },
            record_length,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_length_matches_prefix() {
        let entry = LogEntry::new(LogIndex::new(7), b"inc".to_vec());
        let bytes = entry.serialize();
        assert_eq!(bytes.len(), RECORD_OVERHEAD + 3);
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(len, bytes.len());
    }

    #[test]
    fn test_deserialize_reports_consumed_bytes() {
        let first = LogEntry::new(LogIndex::new(1), b"a".to_vec());
        let second = LogEntry::new(LogIndex::new(2), b"bb".to_vec());
        let mut buf = first.serialize();
        buf.extend_from_slice(&second.serialize());

        let (decoded, consumed) = LogEntry::deserialize(&buf).unwrap();
        assert_eq!(decoded, first);
        let (decoded, _) = LogEntry::deserialize(&buf[consumed..]).unwrap();
        assert_eq!(decoded, second);
    }

    #[test]
    fn test_empty_payload_allowed() {
        let entry = LogEntry::new(LogIndex::new(3), Vec::new());
        let (decoded, consumed) = LogEntry::deserialize(&entry.serialize()).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(consumed, RECORD_OVERHEAD);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut bytes = LogEntry::new(LogIndex::new(1), b"payload".to_vec()).serialize();
        bytes[13] ^= 0xff;
        let err = LogEntry::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_record_detected() {
        let bytes = LogEntry::new(LogIndex::new(1), b"payload".to_vec()).serialize();
        let err = LogEntry::deserialize(&bytes[..bytes.len() - 2]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
