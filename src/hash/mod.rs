//! Content hashing

use crate::types::SyncError;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// 256-bit Blake3 digest of a file's full content
pub type ContentHash = [u8; 32];

/// Read buffer size; hashing memory stays bounded regardless of file size
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Compute Blake3 hash of a file
///
/// The file is streamed in 64KB chunks, so memory use does not grow with
/// file size.
///
/// # Example
/// ```no_run
/// use shiftsync::hash::compute_hash;
/// use std::path::Path;
///
/// let hash = compute_hash(Path::new("file.txt"))?;
/// # Ok::<(), shiftsync::types::SyncError>(())
/// ```
pub fn compute_hash(file_path: &Path) -> Result<ContentHash, SyncError> {
    let mut file = File::open(file_path).map_err(SyncError::Io)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(SyncError::Io)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[0..bytes_read]);
    }

    Ok(*hasher.finalize().as_bytes())
}

/// Lowercase hex rendering used in reports and the persisted cache
pub fn to_hex(hash: &ContentHash) -> String {
    blake3::Hash::from(*hash).to_hex().to_string()
}

/// Parse a hash previously rendered by [`to_hex`]
pub fn from_hex(text: &str) -> Option<ContentHash> {
    blake3::Hash::from_hex(text).ok().map(|h| *h.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hash_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let hash = compute_hash(temp_file.path()).unwrap();
        assert_eq!(hash, *blake3::hash(b"").as_bytes());
    }

    #[test]
    fn test_hash_deterministic() {
        let content = b"Test content for hashing";

        let mut file1 = NamedTempFile::new().unwrap();
        file1.write_all(content).unwrap();
        file1.flush().unwrap();

        let mut file2 = NamedTempFile::new().unwrap();
        file2.write_all(content).unwrap();
        file2.flush().unwrap();

        assert_eq!(
            compute_hash(file1.path()).unwrap(),
            compute_hash(file2.path()).unwrap()
        );
    }

    #[test]
    fn test_hash_larger_than_one_chunk() {
        let content = vec![7u8; HASH_CHUNK_SIZE * 3 + 17];
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&content).unwrap();
        file.flush().unwrap();

        let hash = compute_hash(file.path()).unwrap();
        assert_eq!(hash, *blake3::hash(&content).as_bytes());
    }

    #[test]
    fn test_hash_nonexistent_file() {
        assert!(compute_hash(Path::new("/nonexistent/file.txt")).is_err());
    }

    #[test]
    fn test_hex_parses_back() {
        let hash = *blake3::hash(b"abc").as_bytes();
        let text = to_hex(&hash);
        assert_eq!(text.len(), 64);
        assert_eq!(from_hex(&text), Some(hash));
        assert_eq!(from_hex("not-hex"), None);
    }
}
