//! Log record framing.
//!
//! Every mutation of a [`crate::LogStore`] is one self-delimiting record:
//!
//! ```text
//! [record_len u32][sequence u64][flags u8][collection_len u16][key_len u16]
//! [collection bytes][key bytes][value bytes][crc32 u32]
//! ```
//!
//! All integers are little-endian. `record_len` counts the whole record
//! including itself and the trailing CRC, which covers every byte before it.

use crate::error::{StorageError, StorageResult};

/// Flags for log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags(u8);

impl RecordFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Record deletes the key.
    pub const TOMBSTONE: Self = Self(0x01);

    /// Creates flags from the raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// Returns the raw byte value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Checks if the tombstone flag is set.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & 0x01 != 0
    }
}

/// One put or delete in the key/value log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Monotonic write sequence within the log.
    pub sequence: u64,
    /// Record flags.
    pub flags: RecordFlags,
    /// Collection the key belongs to.
    pub collection: String,
    /// Key within the collection.
    pub key: String,
    /// Encoded value (empty for tombstones).
    pub value: Vec<u8>,
}

impl LogRecord {
    /// Bytes before the variable-length section.
    pub const HEADER_SIZE: usize = 17;
    /// Trailing checksum size.
    pub const CRC_SIZE: usize = 4;
    /// Bytes needed to learn a record's length.
    pub const LEN_PREFIX: usize = 4;

    /// Creates a put record.
    pub fn put(
        sequence: u64,
        collection: impl Into<String>,
        key: impl Into<String>,
        value: Vec<u8>,
    ) -> Self {
        Self {
            sequence,
            flags: RecordFlags::NONE,
            collection: collection.into(),
            key: key.into(),
            value,
        }
    }

    /// Creates a tombstone record.
    pub fn tombstone(sequence: u64, collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            sequence,
            flags: RecordFlags::TOMBSTONE,
            collection: collection.into(),
            key: key.into(),
            value: Vec::new(),
        }
    }

    /// Returns whether this record deletes its key.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.flags.is_tombstone()
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::HEADER_SIZE
            + self.collection.len()
            + self.key.len()
            + self.value.len()
            + Self::CRC_SIZE
    }

    /// Encodes the record to bytes.
    ///
    /// # Errors
    ///
    /// Fails if the collection or key is longer than `u16::MAX` bytes, or
    /// the whole record would not fit a `u32` length.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let collection_len = u16::try_from(self.collection.len()).map_err(|_| {
            StorageError::InvalidKey(format!("collection name too long: {}", self.collection.len()))
        })?;
        let key_len = u16::try_from(self.key.len())
            .map_err(|_| StorageError::InvalidKey(format!("key too long: {}", self.key.len())))?;
        let record_len = u32::try_from(self.encoded_size())
            .map_err(|_| StorageError::InvalidKey("record exceeds 4 GiB".into()))?;

        let mut buf = Vec::with_capacity(record_len as usize);
        buf.extend_from_slice(&record_len.to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.push(self.flags.as_byte());
        buf.extend_from_slice(&collection_len.to_le_bytes());
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(self.collection.as_bytes());
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(&self.value);

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        Ok(buf)
    }

    /// Reads the total record length from a 4-byte prefix.
    #[must_use]
    pub fn length_from_prefix(prefix: [u8; 4]) -> usize {
        u32::from_le_bytes(prefix) as usize
    }

    /// Decodes a record from bytes.
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        if data.len() < Self::HEADER_SIZE + Self::CRC_SIZE {
            return Err(StorageError::corrupted("record too short"));
        }

        let record_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_len < Self::HEADER_SIZE + Self::CRC_SIZE || data.len() < record_len {
            return Err(StorageError::corrupted("incomplete record"));
        }

        let stored_crc = u32::from_le_bytes([
            data[record_len - 4],
            data[record_len - 3],
            data[record_len - 2],
            data[record_len - 1],
        ]);
        let computed_crc = compute_crc32(&data[..record_len - 4]);
        if stored_crc != computed_crc {
            return Err(StorageError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let sequence = u64::from_le_bytes([
            data[4], data[5], data[6], data[7], data[8], data[9], data[10], data[11],
        ]);
        let flags = RecordFlags::from_byte(data[12]);
        let collection_len = u16::from_le_bytes([data[13], data[14]]) as usize;
        let key_len = u16::from_le_bytes([data[15], data[16]]) as usize;

        let collection_start = Self::HEADER_SIZE;
        let key_start = collection_start + collection_len;
        let value_start = key_start + key_len;
        let value_end = record_len - Self::CRC_SIZE;
        if value_start > value_end {
            return Err(StorageError::corrupted("key lengths exceed record length"));
        }

        let collection = std::str::from_utf8(&data[collection_start..key_start])
            .map_err(|_| StorageError::corrupted("collection is not UTF-8"))?
            .to_owned();
        let key = std::str::from_utf8(&data[key_start..value_start])
            .map_err(|_| StorageError::corrupted("key is not UTF-8"))?
            .to_owned();

        Ok(Self {
            sequence,
            flags,
            collection,
            key,
            value: data[value_start..value_end].to_vec(),
        })
    }
}

/// Computes CRC32 checksum for data.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial, table built at compile time
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
    use proptest::prelude::*;

    #[test]
    fn crc32_known_vector() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn put_record_decodes() {
        let record = LogRecord::put(7, "sync_queue", "item-1", vec![0xA1, 0x01]);
        let bytes = record.encode().unwrap();
        assert_eq!(bytes.len(), record.encoded_size());

        let decoded = LogRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert!(!decoded.is_tombstone());
    }

    #[test]
    fn tombstone_has_no_value() {
        let record = LogRecord::tombstone(9, "cache", "orders:list");
        let decoded = LogRecord::decode(&record.encode().unwrap()).unwrap();
        assert!(decoded.is_tombstone());
        assert!(decoded.value.is_empty());
        assert_eq!(decoded.key, "orders:list");
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut bytes = LogRecord::put(1, "entities", "order:1", b"{}".to_vec())
            .encode()
            .unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;

        assert!(matches!(
            LogRecord::decode(&bytes),
            Err(StorageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn truncated_record_is_incomplete() {
        let bytes = LogRecord::put(1, "entities", "order:1", vec![1, 2, 3, 4])
            .encode()
            .unwrap();
        assert!(matches!(
            LogRecord::decode(&bytes[..bytes.len() - 2]),
            Err(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn oversized_key_is_rejected() {
        let record = LogRecord::put(1, "c", "k".repeat(70_000), Vec::new());
        assert!(matches!(record.encode(), Err(StorageError::InvalidKey(_))));
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            sequence in any::<u64>(),
            collection in "[a-z_]{1,16}",
            key in "\\PC{0,32}",
            value in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let record = LogRecord::put(sequence, collection, key, value);
            let decoded = LogRecord::decode(&record.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, record);
        }
    }
}
