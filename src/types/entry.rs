//! FileEntry - one regular file at scan time

use crate::hash::ContentHash;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Represents a file in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Slash-normalized path relative to the tree root
    pub path: Utf8PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Last modification time
    pub mtime: SystemTime,

    /// Blake3 content hash; present iff the file was read successfully
    pub hash: Option<ContentHash>,
}

impl FileEntry {
    /// Create a new FileEntry without a hash
    pub fn new(path: impl Into<Utf8PathBuf>, size: u64, mtime: SystemTime) -> Self {
        Self {
            path: path.into(),
            size,
            mtime,
            hash: None,
        }
    }

    /// Set the hash for this file entry
    pub fn with_hash(mut self, hash: ContentHash) -> Self {
        self.hash = Some(hash);
        self
    }

    /// Check if this entry has a computed hash
    pub fn has_hash(&self) -> bool {
        self.hash.is_some()
    }

    /// Whether content identity can pair this file with one at another path.
    ///
    /// Zero-length files all share one digest, so they only ever match by path.
    pub fn is_identity_matchable(&self) -> bool {
        self.size > 0 && self.hash.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_new_file_entry() {
        let mtime = UNIX_EPOCH + Duration::from_secs(1000);
        let entry = FileEntry::new("test/file.txt", 1024, mtime);

        assert_eq!(entry.path, Utf8PathBuf::from("test/file.txt"));
        assert_eq!(entry.size, 1024);
        assert_eq!(entry.mtime, mtime);
        assert_eq!(entry.hash, None);
    }

    #[test]
    fn test_with_hash() {
        let entry = FileEntry::new("a.bin", 2048, UNIX_EPOCH).with_hash([42u8; 32]);

        assert_eq!(entry.hash, Some([42u8; 32]));
        assert!(entry.has_hash());
    }

    #[test]
    fn test_empty_file_is_not_identity_matchable() {
        let empty = FileEntry::new("empty.txt", 0, UNIX_EPOCH).with_hash([1u8; 32]);
        let unhashed = FileEntry::new("big.txt", 10, UNIX_EPOCH);
        let full = FileEntry::new("big.txt", 10, UNIX_EPOCH).with_hash([1u8; 32]);

        assert!(!empty.is_identity_matchable());
        assert!(!unhashed.is_identity_matchable());
        assert!(full.is_identity_matchable());
    }

    #[test]
    fn test_serialization() {
        let entry = FileEntry::new("test/serialize.txt", 4096, UNIX_EPOCH + Duration::from_secs(5000))
            .with_hash([1u8; 32]);

        let serialized = serde_json::to_string(&entry).expect("Failed to serialize");
        let deserialized: FileEntry =
            serde_json::from_str(&serialized).expect("Failed to deserialize");

        assert_eq!(entry, deserialized);
    }
}
