//! Atomic file copy and rename-with-fallback

use crate::scanner::PART_FILE_SUFFIX;
use crate::types::SyncError;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Hidden sibling that receives data before the final rename
///
/// The name is a short digest of the destination's file name, so it stays
/// the same length however long that name is. Scans skip the suffix, so an
/// interrupted copy never shows up as content.
pub fn part_path_for(dest: &Path) -> PathBuf {
    let name = dest.file_name().unwrap_or_default();
    let digest = blake3::hash(name.as_encoded_bytes()).to_hex();
    dest.with_file_name(format!(".{}{}", &digest.as_str()[..16], PART_FILE_SUFFIX))
}

/// Copy a file atomically using the write-then-rename strategy
///
/// 1. Stream into the hidden `.part` sibling
/// 2. Flush and sync to disk
/// 3. Preserve permissions and mtime
/// 4. Rename onto the final destination
///
/// The destination's parent directory must already exist.
///
/// # Example
/// ```no_run
/// use shiftsync::executor::copy_file_atomic;
/// use std::path::Path;
///
/// let bytes = copy_file_atomic(Path::new("source.txt"), Path::new("dest.txt"))?;
/// # Ok::<(), shiftsync::types::SyncError>(())
/// ```
pub fn copy_file_atomic(src: &Path, dest: &Path) -> Result<u64, SyncError> {
    let part_path = part_path_for(dest);

    let result = stream_into(src, &part_path).and_then(|bytes| {
        fs::rename(&part_path, dest)?;
        Ok(bytes)
    });

    if result.is_err() {
        // Best effort; the scanner ignores stragglers anyway
        let _ = fs::remove_file(&part_path);
    }
    result.map_err(|e| SyncError::Execution {
        path: dest.to_path_buf(),
        reason: e.to_string(),
    })
}

fn stream_into(src: &Path, part_path: &Path) -> io::Result<u64> {
    let mut src_file = File::open(src)?;
    let mut part_file = File::create(part_path)?;

    let mut buffer = vec![0u8; 128 * 1024];
    let mut total_bytes = 0u64;

    loop {
        let bytes_read = src_file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        part_file.write_all(&buffer[..bytes_read])?;
        total_bytes += bytes_read as u64;
    }

    part_file.sync_all()?;
    // Handle must be closed before rename on Windows
    drop(part_file);

    let src_metadata = fs::metadata(src)?;
    fs::set_permissions(part_path, src_metadata.permissions())?;
    let mtime = filetime::FileTime::from_system_time(src_metadata.modified()?);
    filetime::set_file_mtime(part_path, mtime)?;

    Ok(total_bytes)
}

/// Rename `from` to `to`, falling back to copy + remove across devices
///
/// Returns the number of bytes physically copied (0 for a plain rename).
pub fn move_file(from: &Path, to: &Path) -> Result<u64, SyncError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(0),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!(from = %from.display(), to = %to.display(), "rename crosses devices, copying");
            let bytes = copy_file_atomic(from, to)?;
            fs::remove_file(from).map_err(|e| SyncError::Execution {
                path: from.to_path_buf(),
                reason: format!("copied but could not remove original: {}", e),
            })?;
            Ok(bytes)
        }
        Err(e) => Err(SyncError::Execution {
            path: from.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_part_path_is_hidden_sibling() {
        let part = part_path_for(Path::new("/t/docs/report.txt"));
        let name = part.file_name().and_then(|n| n.to_str()).expect("utf-8 name");

        assert_eq!(part.parent(), Some(Path::new("/t/docs")));
        assert!(name.starts_with('.'));
        assert!(name.ends_with(PART_FILE_SUFFIX));
        assert_ne!(part, part_path_for(Path::new("/t/docs/other.txt")));
    }

    #[test]
    fn test_part_name_length_is_fixed() {
        let short = part_path_for(Path::new("/t/a"));
        let long = part_path_for(&Path::new("/t").join("n".repeat(250)));

        let len = |p: &Path| p.file_name().map_or(0, |n| n.len());
        assert_eq!(len(&short), len(&long));
        assert!(len(&long) < 64);
    }

    #[test]
    fn test_copy_leaves_no_part_file() {
        let temp = TempDir::new().expect("create temp dir");
        let src = temp.path().join("src.bin");
        let dest = temp.path().join("dest.bin");
        fs::write(&src, vec![7u8; 300_000]).expect("write src");

        let bytes = copy_file_atomic(&src, &dest).expect("copy");
        assert_eq!(bytes, 300_000);
        assert_eq!(fs::read(&dest).expect("read dest"), vec![7u8; 300_000]);
        assert!(!part_path_for(&dest).exists());
    }

    #[test]
    fn test_copy_missing_source_cleans_up() {
        let temp = TempDir::new().expect("create temp dir");
        let dest = temp.path().join("dest.txt");

        let err = copy_file_atomic(&temp.path().join("missing.txt"), &dest).unwrap_err();
        assert!(matches!(err, SyncError::Execution { .. }));
        assert!(!dest.exists());
        assert!(!part_path_for(&dest).exists());
    }

    #[test]
    fn test_move_file_renames() {
        let temp = TempDir::new().expect("create temp dir");
        let from = temp.path().join("a.txt");
        let to = temp.path().join("b.txt");
        fs::write(&from, b"payload").expect("write src");

        let copied = move_file(&from, &to).expect("move");
        assert_eq!(copied, 0);
        assert!(!from.exists());
        assert_eq!(fs::read(&to).expect("read moved"), b"payload");
    }

    #[test]
    fn test_move_missing_source_fails() {
        let temp = TempDir::new().expect("create temp dir");
        let result = move_file(&temp.path().join("nope"), &temp.path().join("x"));
        assert!(result.is_err());
    }
}
