//! Log record format.
//!
//! ```text
//! | magic (4) | type (1) | key_len (4) | value_len (4) | key | value | crc32 (4) |
//! ```
//!
//! Integers are little-endian. The checksum covers everything before it.

use crate::error::{StorageError, StorageResult};

/// Magic bytes identifying a log record.
pub const LOG_MAGIC: [u8; 4] = *b"SLOG";

/// Size of the fixed record header.
pub const HEADER_SIZE: usize = 4 + 1 + 4 + 4;

/// Size of the trailing checksum.
pub const CRC_SIZE: usize = 4;

/// Type of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Key now maps to the record's value.
    Put = 1,
    /// Key is removed.
    Delete = 2,
}

impl RecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A decoded record, borrowing from the scanned buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<'a> {
    /// Record type.
    pub kind: RecordType,
    /// Key bytes.
    pub key: &'a [u8],
    /// Value bytes (empty for deletes).
    pub value: &'a [u8],
}

impl Record<'_> {
    /// Total encoded length.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len() + CRC_SIZE
    }

    /// Offset of the value relative to the start of the record.
    #[must_use]
    pub fn value_offset(&self) -> usize {
        HEADER_SIZE + self.key.len()
    }
}

/// Encodes a record into `out`.
///
/// # Errors
///
/// Returns [`StorageError::RecordTooLarge`] if the key or value does not fit a
/// 32-bit length.
pub fn encode_into(
    out: &mut Vec<u8>,
    kind: RecordType,
    key: &[u8],
    value: &[u8],
) -> StorageResult<()> {
    let key_len = u32::try_from(key.len()).map_err(|_| StorageError::RecordTooLarge {
        size: key.len(),
    })?;
    let value_len = u32::try_from(value.len()).map_err(|_| StorageError::RecordTooLarge {
        size: value.len(),
    })?;

    let start = out.len();
    out.reserve(HEADER_SIZE + key.len() + value.len() + CRC_SIZE);
    out.extend_from_slice(&LOG_MAGIC);
    out.push(kind as u8);
    out.extend_from_slice(&key_len.to_le_bytes());
    out.extend_from_slice(&value_len.to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(value);
    let crc = compute_crc32(&out[start..]);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(())
}

/// Decodes the record starting at `buf[0]`.
///
/// Returns `Ok(None)` if `buf` ends before the record does (a torn tail).
/// `offset` is only used in error messages.
///
/// # Errors
///
/// Bad magic, unknown type or a checksum mismatch.
pub fn decode(buf: &[u8], offset: u64) -> StorageResult<Option<Record<'_>>> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    if buf[0..4] != LOG_MAGIC {
        return Err(StorageError::corrupted(format!(
            "invalid magic at offset {offset}"
        )));
    }

    let type_byte = buf[4];
    let kind = RecordType::from_byte(type_byte).ok_or_else(|| {
        StorageError::corrupted(format!("unknown record type {type_byte} at offset {offset}"))
    })?;

    let key_len = u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]) as usize;
    let value_len = u32::from_le_bytes([buf[9], buf[10], buf[11], buf[12]]) as usize;

    let body_end = HEADER_SIZE + key_len + value_len;
    let total_len = body_end + CRC_SIZE;
    if buf.len() < total_len {
        return Ok(None);
    }

    let stored = u32::from_le_bytes([
        buf[body_end],
        buf[body_end + 1],
        buf[body_end + 2],
        buf[body_end + 3],
    ]);
    let computed = compute_crc32(&buf[..body_end]);
    if stored != computed {
        return Err(StorageError::ChecksumMismatch {
            offset,
            expected: stored,
            actual: computed,
        });
    }

    Ok(Some(Record {
        kind,
        key: &buf[HEADER_SIZE..HEADER_SIZE + key_len],
        value: &buf[HEADER_SIZE + key_len..body_end],
    }))
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial, reflected
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(kind: RecordType, key: &[u8], value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_into(&mut out, kind, key, value).unwrap();
        out
    }

    #[test]
    fn put_record_decodes() {
        let bytes = encoded(RecordType::Put, b"L1", b"snapshot");
        let record = decode(&bytes, 0).unwrap().unwrap();
        assert_eq!(record.kind, RecordType::Put);
        assert_eq!(record.key, b"L1");
        assert_eq!(record.value, b"snapshot");
        assert_eq!(record.encoded_len(), bytes.len());
        assert_eq!(&bytes[record.value_offset()..][..8], b"snapshot");
    }

    #[test]
    fn truncated_record_is_torn() {
        let bytes = encoded(RecordType::Delete, b"L1", b"");
        for cut in 0..bytes.len() {
            assert!(decode(&bytes[..cut], 0).unwrap().is_none(), "cut at {cut}");
        }
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut bytes = encoded(RecordType::Put, b"L1", b"value");
        let last_body = bytes.len() - CRC_SIZE - 1;
        bytes[last_body] ^= 0x01;
        assert!(matches!(
            decode(&bytes, 64),
            Err(StorageError::ChecksumMismatch { offset: 64, .. })
        ));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut bytes = encoded(RecordType::Put, b"k", b"v");
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes, 0), Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn unknown_type_is_corruption() {
        let mut bytes = encoded(RecordType::Put, b"k", b"v");
        bytes[4] = 9;
        assert!(matches!(decode(&bytes, 0), Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
