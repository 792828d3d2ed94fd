//! Cross-tree matching by content identity
//!
//! Every source and target file ends up in exactly one verdict:
//!
//! 1. Content present in both trees is grouped by hash. Within a group, equal
//!    paths are `Unchanged`; the remaining source and target paths are sorted
//!    and paired index-wise into `Moved`. Surplus on either side falls through.
//! 2. Zero-length (and unhashed) files never take part in identity matching;
//!    they are matched by path only.
//! 3. Leftovers sharing a path are `Modified`; other source leftovers are
//!    `Added`, other target leftovers are `Removed`.

use crate::hash::ContentHash;
use crate::types::Snapshot;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// The matcher's verdict for one file (or one source/target pair)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Same path, same content in both trees
    Unchanged { path: Utf8PathBuf },

    /// Content at target path `from` belongs at source path `to`
    Moved { from: Utf8PathBuf, to: Utf8PathBuf },

    /// Source content with no counterpart in target
    Added { path: Utf8PathBuf },

    /// Target content with no counterpart in source
    Removed { path: Utf8PathBuf },

    /// Same path in both trees, different content
    Modified { path: Utf8PathBuf },
}

impl Verdict {
    /// The source-tree file this verdict accounts for, if any
    pub fn source_path(&self) -> Option<&Utf8Path> {
        match self {
            Verdict::Unchanged { path } | Verdict::Added { path } | Verdict::Modified { path } => {
                Some(path.as_path())
            }
            Verdict::Moved { to, .. } => Some(to.as_path()),
            Verdict::Removed { .. } => None,
        }
    }

    /// The target-tree file this verdict accounts for, if any
    pub fn target_path(&self) -> Option<&Utf8Path> {
        match self {
            Verdict::Unchanged { path }
            | Verdict::Removed { path }
            | Verdict::Modified { path } => Some(path.as_path()),
            Verdict::Moved { from, .. } => Some(from.as_path()),
            Verdict::Added { .. } => None,
        }
    }

    fn sort_key(&self) -> (&Utf8Path, u8) {
        match self {
            Verdict::Unchanged { path } => (path.as_path(), 0),
            Verdict::Moved { to, .. } => (to.as_path(), 1),
            Verdict::Modified { path } => (path.as_path(), 2),
            Verdict::Added { path } => (path.as_path(), 3),
            Verdict::Removed { path } => (path.as_path(), 4),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Unchanged { .. } => "unchanged",
            Verdict::Moved { .. } => "moved",
            Verdict::Added { .. } => "added",
            Verdict::Removed { .. } => "removed",
            Verdict::Modified { .. } => "modified",
        }
    }
}

/// Per-verdict counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationSummary {
    pub unchanged: usize,
    pub moved: usize,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

/// Complete verdict list for a pair of snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub entries: Vec<Verdict>,
}

impl Classification {
    pub fn iter(&self) -> impl Iterator<Item = &Verdict> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when nothing needs to change
    pub fn is_unchanged(&self) -> bool {
        self.entries
            .iter()
            .all(|v| matches!(v, Verdict::Unchanged { .. }))
    }

    /// Source paths accounted for, one per source-side verdict
    pub fn source_paths(&self) -> Vec<&Utf8Path> {
        self.entries.iter().filter_map(Verdict::source_path).collect()
    }

    /// Target paths accounted for, one per target-side verdict
    pub fn target_paths(&self) -> Vec<&Utf8Path> {
        self.entries.iter().filter_map(Verdict::target_path).collect()
    }

    pub fn summary(&self) -> ClassificationSummary {
        let mut summary = ClassificationSummary::default();
        for verdict in &self.entries {
            match verdict {
                Verdict::Unchanged { .. } => summary.unchanged += 1,
                Verdict::Moved { .. } => summary.moved += 1,
                Verdict::Added { .. } => summary.added += 1,
                Verdict::Removed { .. } => summary.removed += 1,
                Verdict::Modified { .. } => summary.modified += 1,
            }
        }
        summary
    }
}

/// Classify every file of both snapshots by content identity, then by path
pub fn classify(source: &Snapshot, target: &Snapshot) -> Classification {
    let mut entries = Vec::new();
    let mut unmatched_source: BTreeSet<&Utf8PathBuf> = BTreeSet::new();
    let mut unmatched_target: BTreeSet<&Utf8PathBuf> = BTreeSet::new();

    // Content groups on the source side, paths in lexicographic order
    let mut source_groups: BTreeMap<ContentHash, Vec<&Utf8PathBuf>> = BTreeMap::new();
    for (path, entry) in source.iter() {
        match entry.hash {
            Some(hash) if entry.is_identity_matchable() => {
                source_groups.entry(hash).or_default().push(path)
            }
            _ => {
                unmatched_source.insert(path);
            }
        }
    }

    for (path, entry) in target.iter() {
        let in_shared_group = entry.is_identity_matchable()
            && entry
                .hash
                .is_some_and(|hash| source_groups.contains_key(&hash));
        if !in_shared_group {
            unmatched_target.insert(path);
        }
    }

    for (hash, source_paths) in &source_groups {
        let target_paths: BTreeSet<&Utf8PathBuf> = target
            .paths_with_hash(hash)
            .into_iter()
            .flatten()
            .filter(|path| {
                target
                    .get(path)
                    .is_some_and(|entry| entry.is_identity_matchable())
            })
            .collect();

        if target_paths.is_empty() {
            unmatched_source.extend(source_paths.iter().copied());
            continue;
        }

        let mut source_rest = Vec::new();
        for path in source_paths {
            if target_paths.contains(path) {
                entries.push(Verdict::Unchanged {
                    path: (*path).clone(),
                });
            } else {
                source_rest.push(*path);
            }
        }
        let target_rest: Vec<&Utf8PathBuf> = target_paths
            .into_iter()
            .filter(|path| !source_paths.contains(path))
            .collect();

        // Deterministic tie-break: lexicographic order, paired index-wise
        for (src_path, tgt_path) in source_rest.iter().zip(target_rest.iter()) {
            debug!(from = %tgt_path, to = %src_path, "content moved");
            entries.push(Verdict::Moved {
                from: (*tgt_path).clone(),
                to: (*src_path).clone(),
            });
        }
        let paired = source_rest.len().min(target_rest.len());
        unmatched_source.extend(source_rest.into_iter().skip(paired));
        unmatched_target.extend(target_rest.into_iter().skip(paired));
    }

    for path in unmatched_source {
        if unmatched_target.remove(path) {
            let same_content = match (source.get(path), target.get(path)) {
                (Some(src), Some(tgt)) => {
                    src.hash.is_some() && src.hash == tgt.hash && src.size == tgt.size
                }
                _ => false,
            };
            if same_content {
                entries.push(Verdict::Unchanged { path: path.clone() });
            } else {
                entries.push(Verdict::Modified { path: path.clone() });
            }
        } else {
            entries.push(Verdict::Added { path: path.clone() });
        }
    }

    for path in unmatched_target {
        entries.push(Verdict::Removed { path: path.clone() });
    }

    entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    Classification { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileEntry;
    use std::path::PathBuf;
    use std::time::UNIX_EPOCH;

    fn snapshot(files: &[(&str, &str)]) -> Snapshot {
        let mut snapshot = Snapshot::new(PathBuf::from("/root"));
        for (path, content) in files {
            snapshot.insert(
                FileEntry::new(*path, content.len() as u64, UNIX_EPOCH)
                    .with_hash(*blake3::hash(content.as_bytes()).as_bytes()),
            );
        }
        snapshot
    }

    fn moved(from: &str, to: &str) -> Verdict {
        Verdict::Moved {
            from: from.into(),
            to: to.into(),
        }
    }

    #[test]
    fn test_identical_trees_are_unchanged() {
        let src = snapshot(&[("a.txt", "A"), ("d/b.txt", "B")]);
        let tgt = snapshot(&[("a.txt", "A"), ("d/b.txt", "B")]);

        let classification = classify(&src, &tgt);
        assert!(classification.is_unchanged());
        assert_eq!(classification.summary().unchanged, 2);
    }

    #[test]
    fn test_duplicate_content_pairs_lexicographically() {
        let src = snapshot(&[("s1", "X"), ("s2", "X"), ("s3", "X")]);
        let tgt = snapshot(&[("t2", "X"), ("t1", "X")]);

        let classification = classify(&src, &tgt);
        assert_eq!(
            classification.entries,
            vec![
                moved("t1", "s1"),
                moved("t2", "s2"),
                Verdict::Added { path: "s3".into() },
            ]
        );
    }

    #[test]
    fn test_equal_path_wins_over_move_in_group() {
        let src = snapshot(&[("a", "X"), ("b", "X")]);
        let tgt = snapshot(&[("b", "X"), ("c", "X")]);

        let classification = classify(&src, &tgt);
        assert_eq!(
            classification.entries,
            vec![moved("c", "a"), Verdict::Unchanged { path: "b".into() }]
        );
    }

    #[test]
    fn test_surplus_target_copies_are_removed() {
        let src = snapshot(&[("keep", "X")]);
        let tgt = snapshot(&[("a", "X"), ("b", "X")]);

        let classification = classify(&src, &tgt);
        assert_eq!(
            classification.entries,
            vec![Verdict::Removed { path: "b".into() }, moved("a", "keep")]
        );
    }

    #[test]
    fn test_empty_files_match_by_path_only() {
        let src = snapshot(&[("new_empty", ""), ("same_empty", "")]);
        let tgt = snapshot(&[("old_empty", ""), ("same_empty", "")]);

        let classification = classify(&src, &tgt);
        assert_eq!(
            classification.entries,
            vec![
                Verdict::Added {
                    path: "new_empty".into()
                },
                Verdict::Removed {
                    path: "old_empty".into()
                },
                Verdict::Unchanged {
                    path: "same_empty".into()
                },
            ]
        );
    }

    #[test]
    fn test_emptied_file_is_modified() {
        let src = snapshot(&[("f", "")]);
        let tgt = snapshot(&[("f", "content")]);

        let classification = classify(&src, &tgt);
        assert_eq!(
            classification.entries,
            vec![Verdict::Modified { path: "f".into() }]
        );
    }

    #[test]
    fn test_move_into_path_of_other_content() {
        // Target `a` holds what source keeps at `b`; source `a` is new content
        let src = snapshot(&[("a", "NEW"), ("b", "OLD")]);
        let tgt = snapshot(&[("a", "OLD")]);

        let classification = classify(&src, &tgt);
        assert_eq!(
            classification.entries,
            vec![Verdict::Added { path: "a".into() }, moved("a", "b")]
        );
    }

    #[test]
    fn test_source_and_target_paths_partition() {
        let src = snapshot(&[("a", "1"), ("b", "2"), ("c", "3"), ("e", "")]);
        let tgt = snapshot(&[("a", "1"), ("x", "2"), ("c", "changed"), ("z", "9")]);

        let classification = classify(&src, &tgt);
        let mut src_paths: Vec<&str> = classification
            .source_paths()
            .into_iter()
            .map(|p| p.as_str())
            .collect();
        src_paths.sort();
        let mut tgt_paths: Vec<&str> = classification
            .target_paths()
            .into_iter()
            .map(|p| p.as_str())
            .collect();
        tgt_paths.sort();

        assert_eq!(src_paths, vec!["a", "b", "c", "e"]);
        assert_eq!(tgt_paths, vec!["a", "c", "x", "z"]);
        assert_eq!(
            classification.summary(),
            ClassificationSummary {
                unchanged: 1,
                moved: 1,
                added: 1,
                removed: 1,
                modified: 1,
            }
        );
    }
}
