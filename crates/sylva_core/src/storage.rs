//! Persisted hierarchy index record.
//!
//! ## Format
//!
//! A storage part is written as a short header followed by a CBOR body:
//! ```text
//! StoragePart {
//!     magic: [0x53, 0x59, 0x48, 0x49] // "SYHI"
//!     version: u8
//!     body: CBOR {
//!         index_key: i32
//!         roots: [i32]
//!         level_index: [(parent: i32, children: [i32])]
//!         item_index: [(node: i32, parent: i32 | null)]
//!         orphans: [i32]
//!     }
//! }
//! ```
//!
//! Every list is sorted by id, so equal indexes produce identical bytes.

use crate::config::{Config, STORAGE_FORMAT_VERSION};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Magic bytes for storage parts: "SYHI"
const STORAGE_MAGIC: [u8; 4] = [0x53, 0x59, 0x48, 0x49];

const HEADER_LEN: usize = STORAGE_MAGIC.len() + 1;

/// Snapshot of a hierarchy index as it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyIndexStoragePart {
    /// Key of the index within its owning collection.
    pub index_key: i32,
    /// Root node ids, ascending.
    pub roots: Vec<i32>,
    /// Children of every attached node, ascending by parent id.
    pub level_index: Vec<(i32, Vec<i32>)>,
    /// Declared parent of every node, ascending by node id.
    pub item_index: Vec<(i32, Option<i32>)>,
    /// Orphaned node ids, ascending.
    pub orphans: Vec<i32>,
}

impl HierarchyIndexStoragePart {
    /// Encodes the part with the current format version.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        self.encode_with_version(STORAGE_FORMAT_VERSION)
    }

    /// Encodes the part with the format version from `config`.
    pub fn encode_with_config(&self, config: &Config) -> CoreResult<Vec<u8>> {
        self.encode_with_version(config.storage_format_version)
    }

    fn encode_with_version(&self, version: u8) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 16 * self.item_index.len());
        buf.extend_from_slice(&STORAGE_MAGIC);
        buf.push(version);
        ciborium::into_writer(self, &mut buf)?;
        Ok(buf)
    }

    /// Decodes a part written by [`encode`](Self::encode).
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(CoreError::invalid_format("storage part too small"));
        }
        if data[..STORAGE_MAGIC.len()] != STORAGE_MAGIC {
            return Err(CoreError::invalid_format("invalid storage part magic"));
        }
        let version = data[STORAGE_MAGIC.len()];
        if version == 0 || version > STORAGE_FORMAT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported storage part version: {version}"
            )));
        }
        Ok(ciborium::from_reader(&data[HEADER_LEN..])?)
    }

    /// Writes the encoded part to `path`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> CoreResult<()> {
        fs::write(path, self.encode()?)?;
        Ok(())
    }

    /// Reads and decodes a part from `path`.
    pub fn read_from(path: impl AsRef<Path>) -> CoreResult<Self> {
        Self::decode(&fs::read(path)?)
    }

    /// Number of nodes recorded in the part, orphans included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.item_index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HierarchyIndexStoragePart {
        HierarchyIndexStoragePart {
            index_key: 7,
            roots: vec![1],
            level_index: vec![(1, vec![2]), (2, vec![])],
            item_index: vec![(1, None), (2, Some(1)), (5, Some(4))],
            orphans: vec![5],
        }
    }

    #[test]
    fn encode_decode() {
        let part = sample();
        let bytes = part.encode().unwrap();
        assert_eq!(&bytes[..4], b"SYHI");
        assert_eq!(bytes[4], STORAGE_FORMAT_VERSION);
        assert_eq!(HierarchyIndexStoragePart::decode(&bytes).unwrap(), part);
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(sample().encode().unwrap(), sample().encode().unwrap());
    }

    #[test]
    fn rejects_bad_headers() {
        let mut bytes = sample().encode().unwrap();

        assert!(matches!(
            HierarchyIndexStoragePart::decode(&bytes[..3]),
            Err(CoreError::InvalidFormat { .. })
        ));

        bytes[4] = STORAGE_FORMAT_VERSION + 1;
        assert!(matches!(
            HierarchyIndexStoragePart::decode(&bytes),
            Err(CoreError::InvalidFormat { .. })
        ));

        bytes[0] = b'X';
        assert!(matches!(
            HierarchyIndexStoragePart::decode(&bytes),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn truncated_body_is_a_codec_error() {
        let bytes = sample().encode().unwrap();
        let truncated = &bytes[..bytes.len() - 2];
        assert!(matches!(
            HierarchyIndexStoragePart::decode(truncated),
            Err(CoreError::Decode(_))
        ));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hierarchy.syhi");
        sample().write_to(&path).unwrap();
        assert_eq!(HierarchyIndexStoragePart::read_from(&path).unwrap(), sample());
        assert!(matches!(
            HierarchyIndexStoragePart::read_from(dir.path().join("missing.syhi")),
            Err(CoreError::Io(_))
        ));
    }

    #[test]
    fn custom_version_is_written() {
        let config = Config::new().storage_format_version(STORAGE_FORMAT_VERSION);
        let bytes = sample().encode_with_config(&config).unwrap();
        assert_eq!(bytes[4], STORAGE_FORMAT_VERSION);
    }
}
