//! Tests for atomic file copy and rename operations

use shiftsync::executor::{copy_file_atomic, move_file, part_path_for};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn create_test_file(path: &Path, content: &[u8]) {
    let mut file = fs::File::create(path).expect("Failed to create test file");
    file.write_all(content)
        .expect("Failed to write test content");
    file.flush().expect("Failed to flush");
}

fn set_file_mtime(path: &Path, mtime: SystemTime) {
    let filetime_mtime = filetime::FileTime::from_system_time(mtime);
    filetime::set_file_mtime(path, filetime_mtime).expect("Failed to set mtime");
}

fn mtime_of(path: &Path) -> SystemTime {
    fs::metadata(path)
        .expect("Failed to read metadata")
        .modified()
        .expect("Failed to get mtime")
}

#[test]
fn test_copy_basic_content() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();

    let src_path = root.join("source.txt");
    let content = b"Hello, shiftsync! This is a test file.";
    create_test_file(&src_path, content);

    let dest_path = root.join("dest.txt");
    let bytes_copied =
        copy_file_atomic(&src_path, &dest_path).expect("copy_file_atomic should succeed");

    assert_eq!(bytes_copied, content.len() as u64);
    assert_eq!(fs::read(&dest_path).expect("Failed to read dest file"), content);
}

#[test]
fn test_copy_requires_existing_parent() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();

    let src_path = root.join("source.txt");
    create_test_file(&src_path, b"test content");

    // Directory creation is a separate planned step
    let dest_path = root.join("a/b/c/dest.txt");
    assert!(copy_file_atomic(&src_path, &dest_path).is_err());
    assert!(!root.join("a").exists());
}

#[test]
fn test_copy_preserves_mtime() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();

    let src_path = root.join("source.txt");
    create_test_file(&src_path, b"test content");

    let mtime = SystemTime::now() - Duration::from_secs(3600);
    set_file_mtime(&src_path, mtime);

    let dest_path = root.join("dest.txt");
    copy_file_atomic(&src_path, &dest_path).expect("copy_file_atomic should succeed");

    let src_mtime = mtime_of(&src_path);
    let dest_mtime = mtime_of(&dest_path);
    let diff = src_mtime
        .duration_since(dest_mtime)
        .or_else(|_| dest_mtime.duration_since(src_mtime))
        .expect("compare mtimes");

    assert!(
        diff < Duration::from_secs(2),
        "mtime should be preserved (diff: {:?})",
        diff
    );
}

#[test]
fn test_copy_removes_part_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();

    let src_path = root.join("source.txt");
    create_test_file(&src_path, b"test content");

    let dest_path = root.join("dest.txt");
    copy_file_atomic(&src_path, &dest_path).expect("copy_file_atomic should succeed");

    assert!(
        !part_path_for(&dest_path).exists(),
        ".part file should be gone after a successful copy"
    );
    assert!(dest_path.exists());
}

#[test]
fn test_copy_with_longest_file_names() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();

    let src_path = root.join("source.txt");
    create_test_file(&src_path, b"long name payload");

    // Near the 255-byte limit; the part file must not grow past it
    let dest_path = root.join("x".repeat(245));
    copy_file_atomic(&src_path, &dest_path).expect("copy to a 245-byte name should succeed");

    assert_eq!(
        fs::read(&dest_path).expect("Failed to read dest file"),
        b"long name payload"
    );
    assert!(!part_path_for(&dest_path).exists());
}

#[test]
fn test_copy_large_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();

    let src_path = root.join("large.bin");
    let size = 1024 * 1024;
    let content: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
    create_test_file(&src_path, &content);

    let dest_path = root.join("large_copy.bin");
    let bytes_copied = copy_file_atomic(&src_path, &dest_path)
        .expect("copy_file_atomic should handle large files");

    assert_eq!(bytes_copied, size as u64);
    assert_eq!(fs::read(&dest_path).expect("Failed to read dest file"), content);
}

#[test]
fn test_copy_empty_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();

    let src_path = root.join("empty");
    create_test_file(&src_path, b"");

    let dest_path = root.join("empty_copy");
    assert_eq!(copy_file_atomic(&src_path, &dest_path).expect("copy empty"), 0);
    assert!(dest_path.exists());
}

#[test]
#[cfg(unix)]
fn test_copy_preserves_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();

    let src_path = root.join("source.txt");
    create_test_file(&src_path, b"test content");
    let mut perms = fs::metadata(&src_path)
        .expect("Failed to get metadata")
        .permissions();
    perms.set_mode(0o640);
    fs::set_permissions(&src_path, perms).expect("Failed to set permissions");

    let dest_path = root.join("dest.txt");
    copy_file_atomic(&src_path, &dest_path).expect("copy_file_atomic should succeed");

    let dest_mode = fs::metadata(&dest_path)
        .expect("Failed to get dest metadata")
        .permissions()
        .mode();
    assert_eq!(dest_mode & 0o777, 0o640, "Permissions should be preserved");
}

#[test]
fn test_move_keeps_mtime_and_content() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();

    let from = root.join("before.txt");
    create_test_file(&from, b"relocated");
    let mtime = SystemTime::now() - Duration::from_secs(7200);
    set_file_mtime(&from, mtime);
    let original_mtime = mtime_of(&from);

    fs::create_dir(root.join("sub")).expect("create sub dir");
    let to = root.join("sub/after.txt");
    move_file(&from, &to).expect("move should succeed");

    assert!(!from.exists());
    assert_eq!(fs::read(&to).expect("read moved file"), b"relocated");
    assert_eq!(mtime_of(&to), original_mtime);
}
