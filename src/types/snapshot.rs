//! Snapshot - point-in-time inventory of one tree

use super::FileEntry;
use crate::hash::ContentHash;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::Duration;

/// All file descriptors for one root, indexed by path and by content hash
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Map: relative_path → FileEntry (ordered for deterministic iteration)
    entries: BTreeMap<Utf8PathBuf, FileEntry>,

    /// Map: content hash → every path holding that content
    by_hash: HashMap<ContentHash, BTreeSet<Utf8PathBuf>>,

    /// Directories seen by the walker, including empty ones
    dirs: BTreeSet<Utf8PathBuf>,

    /// Aggregate statistics
    pub total_size: u64,
    pub total_files: usize,
    pub total_dirs: usize,

    /// Scan metadata
    pub scan_duration: Duration,
    pub root_path: PathBuf,
}

impl Snapshot {
    /// Create a new empty Snapshot
    pub fn new(root_path: PathBuf) -> Self {
        Self {
            entries: BTreeMap::new(),
            by_hash: HashMap::new(),
            dirs: BTreeSet::new(),
            total_size: 0,
            total_files: 0,
            total_dirs: 0,
            scan_duration: Duration::from_secs(0),
            root_path,
        }
    }

    /// Insert a file entry, keyed by its own relative path
    ///
    /// If the path already exists, the old entry is replaced and both indexes
    /// and statistics are adjusted.
    pub fn insert(&mut self, entry: FileEntry) {
        self.remove(&entry.path);

        self.total_size += entry.size;
        self.total_files += 1;
        if let Some(hash) = entry.hash {
            self.by_hash
                .entry(hash)
                .or_default()
                .insert(entry.path.clone());
        }
        self.entries.insert(entry.path.clone(), entry);
    }

    /// Drop the entry at `path`, keeping indexes and statistics in step
    pub fn remove(&mut self, path: &Utf8Path) -> Option<FileEntry> {
        let old_entry = self.entries.remove(path)?;
        self.total_size = self.total_size.saturating_sub(old_entry.size);
        self.total_files = self.total_files.saturating_sub(1);
        if let Some(hash) = old_entry.hash {
            self.unindex_hash(&hash, &old_entry.path);
        }
        Some(old_entry)
    }

    fn unindex_hash(&mut self, hash: &ContentHash, path: &Utf8Path) {
        if let Some(paths) = self.by_hash.get_mut(hash) {
            paths.remove(path);
            if paths.is_empty() {
                self.by_hash.remove(hash);
            }
        }
    }

    /// Get a file entry by path
    pub fn get(&self, path: &Utf8Path) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    /// Check if a path exists in the snapshot
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Paths holding the given content, in lexicographic order
    pub fn paths_with_hash(&self, hash: &ContentHash) -> Option<&BTreeSet<Utf8PathBuf>> {
        self.by_hash.get(hash)
    }

    /// Whether any path in this snapshot holds the given content
    pub fn contains_hash(&self, hash: &ContentHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Return the number of file entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterator over all entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&Utf8PathBuf, &FileEntry)> {
        self.entries.iter()
    }

    /// Iterator over just the paths, in path order
    pub fn paths(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.entries.keys()
    }

    /// Every known directory: those recorded by the walker plus every
    /// ancestor of a file path
    pub fn directories(&self) -> BTreeSet<Utf8PathBuf> {
        let mut dirs = self.dirs.clone();
        for path in self.entries.keys() {
            for ancestor in path.ancestors().skip(1) {
                if ancestor.as_str().is_empty() {
                    continue;
                }
                dirs.insert(ancestor.to_path_buf());
            }
        }
        dirs
    }

    /// Set the scan duration after scanning completes
    pub fn set_scan_duration(&mut self, duration: Duration) {
        self.scan_duration = duration;
    }

    /// Record a directory found while walking the tree
    pub fn insert_dir(&mut self, path: impl Into<Utf8PathBuf>) {
        if self.dirs.insert(path.into()) {
            self.total_dirs += 1;
        }
    }
}
