//! Fingerprint cache
//!
//! Remembers the content hash of a file under its `(relative_path, size,
//! mtime)` identity so unchanged files are not rehashed on the next run.
//! The scanner only sees the [`FingerprintCache`] trait; [`CacheStore`] is the
//! file-backed implementation that keeps one namespace per tree root.

use crate::hash::{self, ContentHash};
use crate::types::SyncError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const CACHE_FORMAT_VERSION: u32 = 1;

/// Lookup/upsert interface the scanner depends on
pub trait FingerprintCache: Send + Sync {
    /// Hash for an exact `(path, size, mtime)` match
    fn get(&self, relative_path: &Utf8Path, size: u64, modified_at: SystemTime)
        -> Option<ContentHash>;

    /// Record the hash computed for a file identity (last write wins)
    fn put(&self, relative_path: &Utf8Path, size: u64, modified_at: SystemTime, hash: ContentHash);

    /// Forget whatever is stored for a path
    fn invalidate(&self, relative_path: &Utf8Path);
}

/// Cache that never hits; used when hashing must always happen
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl FingerprintCache for NoCache {
    fn get(&self, _: &Utf8Path, _: u64, _: SystemTime) -> Option<ContentHash> {
        None
    }

    fn put(&self, _: &Utf8Path, _: u64, _: SystemTime, _: ContentHash) {}

    fn invalidate(&self, _: &Utf8Path) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    size: u64,
    modified_at: SystemTime,
    hash: ContentHash,
}

/// In-memory cache for one tree; concurrent reads, serialized writes
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<Utf8PathBuf, Fingerprint>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries for paths that are no longer part of the tree
    pub fn retain_paths(&self, live: &HashSet<&Utf8Path>) {
        if let Ok(mut entries) = self.entries.write() {
            let before = entries.len();
            entries.retain(|path, _| live.contains(path.as_path()));
            let pruned = before - entries.len();
            if pruned > 0 {
                debug!(pruned, "pruned stale fingerprint cache entries");
            }
        }
    }

    fn to_records(&self) -> BTreeMap<Utf8PathBuf, CacheRecord> {
        let Ok(entries) = self.entries.read() else {
            return BTreeMap::new();
        };
        entries
            .iter()
            .map(|(path, fp)| (path.clone(), CacheRecord::from(fp)))
            .collect()
    }

    fn from_records(records: BTreeMap<Utf8PathBuf, CacheRecord>) -> Self {
        let entries = records
            .into_iter()
            .filter_map(|(path, record)| match record.to_fingerprint() {
                Some(fp) => Some((path, fp)),
                None => {
                    warn!(%path, "dropping unreadable fingerprint cache record");
                    None
                }
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }
}

impl FingerprintCache for MemoryCache {
    fn get(
        &self,
        relative_path: &Utf8Path,
        size: u64,
        modified_at: SystemTime,
    ) -> Option<ContentHash> {
        let cached = self.entries.read().ok()?.get(relative_path).copied()?;
        if cached.size == size && cached.modified_at == modified_at {
            return Some(cached.hash);
        }
        // Identity changed since the hash was recorded
        self.invalidate(relative_path);
        None
    }

    fn put(&self, relative_path: &Utf8Path, size: u64, modified_at: SystemTime, hash: ContentHash) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                relative_path.to_path_buf(),
                Fingerprint {
                    size,
                    modified_at,
                    hash,
                },
            );
        }
    }

    fn invalidate(&self, relative_path: &Utf8Path) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(relative_path);
        }
    }
}

/// Persisted form of one fingerprint
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRecord {
    size: u64,
    mtime_secs: u64,
    mtime_nanos: u32,
    hash: String,
}

impl CacheRecord {
    fn to_fingerprint(&self) -> Option<Fingerprint> {
        Some(Fingerprint {
            size: self.size,
            modified_at: UNIX_EPOCH + Duration::new(self.mtime_secs, self.mtime_nanos),
            hash: hash::from_hex(&self.hash)?,
        })
    }
}

impl From<&Fingerprint> for CacheRecord {
    fn from(fp: &Fingerprint) -> Self {
        // Pre-epoch mtimes are clamped; they simply miss on the next lookup
        let since_epoch = fp
            .modified_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            size: fp.size,
            mtime_secs: since_epoch.as_secs(),
            mtime_nanos: since_epoch.subsec_nanos(),
            hash: hash::to_hex(&fp.hash),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    trees: BTreeMap<String, BTreeMap<Utf8PathBuf, CacheRecord>>,
}

/// File-backed cache with one [`MemoryCache`] namespace per tree root
#[derive(Debug, Default)]
pub struct CacheStore {
    location: Option<PathBuf>,
    trees: BTreeMap<String, Arc<MemoryCache>>,
}

impl CacheStore {
    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the store at `location`
    ///
    /// A missing file starts empty. An unreadable or corrupt file is reported
    /// as a warning and also starts empty: the run degrades to a full rehash.
    pub fn open(location: &Path) -> Self {
        let trees = match Self::load(location) {
            Ok(trees) => trees,
            Err(err) => {
                warn!(path = %location.display(), error = %err, "fingerprint cache unusable, rehashing everything");
                BTreeMap::new()
            }
        };
        Self {
            location: Some(location.to_path_buf()),
            trees,
        }
    }

    fn load(location: &Path) -> Result<BTreeMap<String, Arc<MemoryCache>>, SyncError> {
        let raw = match fs::read_to_string(location) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %location.display(), "no fingerprint cache yet");
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(SyncError::Cache(e.to_string())),
        };

        let file: CacheFile =
            serde_json::from_str(&raw).map_err(|e| SyncError::Cache(e.to_string()))?;
        if file.version != CACHE_FORMAT_VERSION {
            return Err(SyncError::Cache(format!(
                "unsupported cache format version {}",
                file.version
            )));
        }

        Ok(file
            .trees
            .into_iter()
            .map(|(root, records)| (root, Arc::new(MemoryCache::from_records(records))))
            .collect())
    }

    /// Where this store persists, if anywhere
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// The namespace for one tree root, created on first use
    pub fn tree(&mut self, root: &Path) -> Arc<MemoryCache> {
        let key = root_key(root);
        Arc::clone(self.trees.entry(key).or_default())
    }

    /// Write the store back to disk (temp file + rename)
    pub fn save(&self) -> Result<(), SyncError> {
        let Some(location) = &self.location else {
            return Ok(());
        };

        let file = CacheFile {
            version: CACHE_FORMAT_VERSION,
            trees: self
                .trees
                .iter()
                .map(|(root, cache)| (root.clone(), cache.to_records()))
                .collect(),
        };
        let json =
            serde_json::to_string_pretty(&file).map_err(|e| SyncError::Cache(e.to_string()))?;

        if let Some(parent) = location.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = location.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, location)?;
        debug!(path = %location.display(), "fingerprint cache saved");
        Ok(())
    }
}

fn root_key(root: &Path) -> String {
    fs::canonicalize(root)
        .unwrap_or_else(|_| root.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_get_requires_exact_identity() {
        let cache = MemoryCache::new();
        let path = Utf8Path::new("docs/a.txt");
        cache.put(path, 10, at(100), [9u8; 32]);

        assert_eq!(cache.get(path, 10, at(100)), Some([9u8; 32]));
        assert_eq!(cache.get(Utf8Path::new("docs/b.txt"), 10, at(100)), None);
    }

    #[test]
    fn test_mismatch_invalidates_entry() {
        let cache = MemoryCache::new();
        let path = Utf8Path::new("a.txt");
        cache.put(path, 10, at(100), [9u8; 32]);

        assert_eq!(cache.get(path, 10, at(101)), None);
        // The stale entry is gone even for the old identity
        assert_eq!(cache.get(path, 10, at(100)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_is_last_write_wins() {
        let cache = MemoryCache::new();
        let path = Utf8Path::new("a.txt");
        cache.put(path, 10, at(100), [1u8; 32]);
        cache.put(path, 12, at(200), [2u8; 32]);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(path, 12, at(200)), Some([2u8; 32]));
    }

    #[test]
    fn test_retain_paths_prunes_stale_entries() {
        let cache = MemoryCache::new();
        cache.put(Utf8Path::new("keep.txt"), 1, at(1), [1u8; 32]);
        cache.put(Utf8Path::new("gone.txt"), 1, at(1), [2u8; 32]);

        let live: HashSet<&Utf8Path> = [Utf8Path::new("keep.txt")].into_iter().collect();
        cache.retain_paths(&live);

        assert_eq!(cache.len(), 1);
        assert!(cache.get(Utf8Path::new("keep.txt"), 1, at(1)).is_some());
    }

    #[test]
    fn test_store_persists_per_root_namespaces() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let location = dir.path().join("cache.json");
        let root_a = dir.path().join("a");
        let root_b = dir.path().join("b");

        {
            let mut store = CacheStore::open(&location);
            store
                .tree(&root_a)
                .put(Utf8Path::new("x.txt"), 3, at(5), [7u8; 32]);
            store.tree(&root_b);
            store.save().expect("save cache");
        }

        let mut reopened = CacheStore::open(&location);
        assert_eq!(
            reopened.tree(&root_a).get(Utf8Path::new("x.txt"), 3, at(5)),
            Some([7u8; 32])
        );
        assert!(reopened.tree(&root_b).is_empty());
    }

    #[test]
    fn test_subsecond_mtime_survives_persistence() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let location = dir.path().join("cache.json");
        let mtime = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);

        let mut store = CacheStore::open(&location);
        store
            .tree(dir.path())
            .put(Utf8Path::new("f"), 1, mtime, [3u8; 32]);
        store.save().expect("save cache");

        let mut reopened = CacheStore::open(&location);
        assert_eq!(
            reopened.tree(dir.path()).get(Utf8Path::new("f"), 1, mtime),
            Some([3u8; 32])
        );
    }

    #[test]
    fn test_corrupt_file_degrades_to_empty_store() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let location = dir.path().join("cache.json");
        fs::write(&location, b"{ not json").expect("write corrupt cache");

        let mut store = CacheStore::open(&location);
        assert!(store.tree(dir.path()).is_empty());
        // Saving over a corrupt file repairs it
        store.save().expect("save repaired cache");
        let raw = fs::read_to_string(&location).expect("read cache");
        assert!(raw.contains("\"version\": 1"));
    }

    #[test]
    fn test_in_memory_store_never_writes() {
        let store = CacheStore::in_memory();
        assert!(store.location().is_none());
        store.save().expect("in-memory save is a no-op");
    }
}
