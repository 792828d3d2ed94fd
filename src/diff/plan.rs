//! Operation plan synthesis
//!
//! MIRROR plans replay against a simulated copy of the target tree while they
//! are built, so every emitted step is known to be applicable at the moment the
//! executor reaches it.

use crate::diff::{Classification, Plan, Verdict};
use crate::types::{paths_overlap, Operation, Snapshot, SyncError, SyncMode, TreePath};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

/// Root-level name prefix for files parked while breaking move cycles
pub const STAGING_PREFIX: &str = ".shiftsync-stage-";

/// Build the MIRROR plan that turns `target` into `source`'s layout
///
/// Emission order: deletes, then moves (cycle-safe), then copies. Missing
/// parent directories are created right before the write that needs them.
///
/// # Example
/// ```
/// use shiftsync::diff::{classify, plan_mirror};
/// use shiftsync::types::{FileEntry, Snapshot};
/// use std::path::PathBuf;
/// use std::time::UNIX_EPOCH;
///
/// let hash = *blake3::hash(b"report").as_bytes();
/// let mut src = Snapshot::new(PathBuf::from("src"));
/// let mut dst = Snapshot::new(PathBuf::from("dst"));
/// src.insert(FileEntry::new("docs/final.txt", 6, UNIX_EPOCH).with_hash(hash));
/// dst.insert(FileEntry::new("draft.txt", 6, UNIX_EPOCH).with_hash(hash));
///
/// let classification = classify(&src, &dst);
/// let plan = plan_mirror(&classification, &src, &dst).unwrap();
/// assert_eq!(plan.stats.move_count, 1);
/// assert_eq!(plan.stats.copy_count, 0);
/// ```
pub fn plan_mirror(
    classification: &Classification,
    source: &Snapshot,
    target: &Snapshot,
) -> Result<Plan, SyncError> {
    let mut builder = MirrorBuilder::new(source, target);

    let mut deletes: Vec<&Utf8Path> = Vec::new();
    let mut moves: Vec<PendingMove> = Vec::new();
    let mut copies: Vec<&Utf8Path> = Vec::new();

    for verdict in classification.iter() {
        match verdict {
            Verdict::Unchanged { .. } => {}
            Verdict::Removed { path } => deletes.push(path),
            Verdict::Modified { path } => {
                deletes.push(path);
                copies.push(path);
            }
            Verdict::Added { path } => copies.push(path),
            Verdict::Moved { from, to } => moves.push(PendingMove {
                from: from.clone(),
                to: to.clone(),
                size: source.get(to).map_or(0, |entry| entry.size),
                staged: false,
            }),
        }
    }

    deletes.sort();
    for path in deletes {
        builder.delete_file(path);
    }

    moves.sort_by(|a, b| a.to.cmp(&b.to));
    builder.schedule_moves(moves);

    copies.sort();
    for path in copies {
        builder.copy(path);
    }

    let plan = builder.plan;
    validate_plan(&plan, source, target)?;

    debug!(
        operations = plan.len(),
        moves = plan.stats.move_count,
        copies = plan.stats.copy_count,
        deletes = plan.stats.delete_count,
        "mirror plan ready"
    );
    Ok(plan)
}

/// Build the MOVE plan: relocate every source file to the same relative path
/// in target
///
/// Never deletes anything and never inspects the target tree. Source
/// directories are left in place.
pub fn plan_move(source: &Snapshot, target_root: PathBuf) -> Plan {
    let mut plan = Plan::new(SyncMode::Move, source.root_path.clone(), target_root);
    let mut created: BTreeSet<&Utf8Path> = BTreeSet::new();

    for (path, entry) in source.iter() {
        for dir in missing_ancestors(path, |dir| created.contains(dir)) {
            created.insert(dir);
            plan.add_operation(
                Operation::CreateDir {
                    path: TreePath::target(dir),
                },
                0,
            );
        }
        plan.add_operation(
            Operation::Move {
                from: TreePath::source(path.as_path()),
                to: TreePath::target(path.as_path()),
            },
            entry.size,
        );
    }

    debug!(operations = plan.len(), "move plan ready");
    plan
}

/// Ancestors of `path` (excluding itself) for which `exists` is false,
/// shallowest first
fn missing_ancestors<'p>(
    path: &'p Utf8Path,
    exists: impl Fn(&Utf8Path) -> bool,
) -> Vec<&'p Utf8Path> {
    let mut missing: Vec<&Utf8Path> = path
        .ancestors()
        .skip(1)
        .filter(|dir| !dir.as_str().is_empty())
        .take_while(|dir| !exists(*dir))
        .collect();
    missing.reverse();
    missing
}

/// True when `set` holds some path strictly beneath `dir`
fn has_descendant(set: &BTreeSet<Utf8PathBuf>, dir: &Utf8Path) -> bool {
    // Component-wise ordering keeps descendants contiguous right after `dir`
    set.range(dir.to_path_buf()..)
        .take_while(|path| path.starts_with(dir))
        .any(|path| path.as_path() != dir)
}

fn has_file_ancestor(files: &BTreeSet<Utf8PathBuf>, path: &Utf8Path) -> Option<Utf8PathBuf> {
    path.ancestors()
        .skip(1)
        .find(|dir| files.contains(*dir))
        .map(Utf8Path::to_path_buf)
}

#[derive(Debug)]
struct PendingMove {
    from: Utf8PathBuf,
    to: Utf8PathBuf,
    size: u64,
    /// `from` is already a staging path
    staged: bool,
}

struct MirrorBuilder<'a> {
    plan: Plan,
    source: &'a Snapshot,
    /// Target files as they stand after the operations emitted so far
    files: BTreeSet<Utf8PathBuf>,
    /// Target directories as they stand after the operations emitted so far
    dirs: BTreeSet<Utf8PathBuf>,
    /// First path components used by either tree
    reserved: BTreeSet<String>,
    next_stage: usize,
}

impl<'a> MirrorBuilder<'a> {
    fn new(source: &'a Snapshot, target: &'a Snapshot) -> Self {
        let dirs = target.directories();
        let reserved = source
            .paths()
            .chain(target.paths())
            .chain(dirs.iter())
            .filter_map(|path| path.components().next())
            .map(|component| component.as_str().to_string())
            .collect();

        Self {
            plan: Plan::new(
                SyncMode::Mirror,
                source.root_path.clone(),
                target.root_path.clone(),
            ),
            source,
            files: target.paths().cloned().collect(),
            dirs,
            reserved,
            next_stage: 0,
        }
    }

    fn delete_file(&mut self, path: &Utf8Path) {
        self.files.remove(path);
        self.plan.add_operation(
            Operation::Delete {
                path: TreePath::target(path),
            },
            0,
        );
    }

    fn copy(&mut self, path: &Utf8Path) {
        self.prepare_write(path);
        let size = self.source.get(path).map_or(0, |entry| entry.size);
        self.plan.add_operation(
            Operation::Copy {
                from: TreePath::source(path),
                to: TreePath::target(path),
            },
            size,
        );
        self.files.insert(path.to_path_buf());
    }

    fn relocate(&mut self, from: &Utf8Path, to: &Utf8Path, size: u64) {
        self.prepare_write(to);
        self.plan.add_operation(
            Operation::Move {
                from: TreePath::target(from),
                to: TreePath::target(to),
            },
            size,
        );
        self.files.remove(from);
        self.files.insert(to.to_path_buf());
    }

    /// Clear a directory standing at `dest` and create missing parents
    fn prepare_write(&mut self, dest: &Utf8Path) {
        if self.dirs.contains(dest) {
            // Deepest first so every removal sees an empty directory
            let doomed: Vec<Utf8PathBuf> = self
                .dirs
                .range(dest.to_path_buf()..)
                .take_while(|dir| dir.starts_with(dest))
                .cloned()
                .collect();
            for dir in doomed.into_iter().rev() {
                self.dirs.remove(&dir);
                self.plan
                    .add_operation(Operation::Delete { path: TreePath::target(dir) }, 0);
            }
        }

        let missing: Vec<Utf8PathBuf> = missing_ancestors(dest, |dir| self.dirs.contains(dir))
            .into_iter()
            .map(Utf8Path::to_path_buf)
            .collect();
        for dir in missing {
            self.dirs.insert(dir.clone());
            self.plan
                .add_operation(Operation::CreateDir { path: TreePath::target(dir) }, 0);
        }
    }

    /// Emit moves so that no destination is written while it (or an
    /// ancestor/descendant) still holds a pending move's source
    fn schedule_moves(&mut self, mut pending: Vec<PendingMove>) {
        while !pending.is_empty() {
            let mut progressed = false;
            let mut index = 0;
            while index < pending.len() {
                if is_blocked(&pending, index) {
                    index += 1;
                    continue;
                }
                let ready = pending.remove(index);
                self.relocate(&ready.from, &ready.to, ready.size);
                progressed = true;
            }

            if !progressed {
                self.break_cycle(&mut pending);
            }
        }
    }

    /// Park one blocking source at a staging path
    fn break_cycle(&mut self, pending: &mut [PendingMove]) {
        let Some(victim) = (0..pending.len()).find(|&candidate| {
            !pending[candidate].staged
                && pending
                    .iter()
                    .any(|other| paths_overlap(&pending[candidate].from, &other.to))
        }) else {
            return;
        };

        let stage = self.staging_path();
        debug!(from = %pending[victim].from, stage = %stage, "breaking move cycle");
        let (from, size) = (pending[victim].from.clone(), pending[victim].size);
        self.relocate(&from, &stage, size);
        pending[victim].from = stage;
        pending[victim].staged = true;
    }

    fn staging_path(&mut self) -> Utf8PathBuf {
        loop {
            let name = format!("{}{}", STAGING_PREFIX, self.next_stage);
            self.next_stage += 1;
            if !self.reserved.contains(&name) {
                return Utf8PathBuf::from(name);
            }
        }
    }
}

fn is_blocked(pending: &[PendingMove], index: usize) -> bool {
    let dest = &pending[index].to;
    pending.iter().any(|other| paths_overlap(&other.from, dest))
}

/// Replay a MIRROR plan against the target snapshot and reject it if any step
/// would clobber a live file or the result diverges from the source layout
pub fn validate_plan(plan: &Plan, source: &Snapshot, target: &Snapshot) -> Result<(), SyncError> {
    let mut files: BTreeSet<Utf8PathBuf> = target.paths().cloned().collect();
    let mut dirs = target.directories();

    for operation in plan.iter() {
        match operation {
            Operation::CreateDir { path } => {
                if files.contains(&path.path) || has_file_ancestor(&files, &path.path).is_some() {
                    return Err(conflict(&path.path, "directory would replace a file"));
                }
                add_with_ancestors(&mut dirs, &path.path);
            }
            Operation::Delete { path } => {
                if !files.remove(&path.path) {
                    if has_descendant(&files, &path.path) || has_descendant(&dirs, &path.path) {
                        return Err(conflict(&path.path, "directory is not empty"));
                    }
                    dirs.remove(&path.path);
                }
            }
            Operation::Move { from, to } => {
                if !files.remove(&from.path) {
                    return Err(conflict(&from.path, "move source is not present"));
                }
                claim(&mut files, &dirs, &to.path).map_err(|reason| conflict(&to.path, reason))?;
            }
            Operation::Copy { to, .. } => {
                claim(&mut files, &dirs, &to.path).map_err(|reason| conflict(&to.path, reason))?;
            }
        }
    }

    let expected: BTreeSet<&Utf8PathBuf> = source.paths().collect();
    let actual: BTreeSet<&Utf8PathBuf> = files.iter().collect();
    if let Some(path) = expected.symmetric_difference(&actual).next() {
        return Err(conflict(path, "plan does not reproduce the source layout"));
    }
    Ok(())
}

fn add_with_ancestors(dirs: &mut BTreeSet<Utf8PathBuf>, dir: &Utf8Path) {
    for ancestor in dir.ancestors() {
        if ancestor.as_str().is_empty() {
            break;
        }
        dirs.insert(ancestor.to_path_buf());
    }
}

fn conflict(path: &Utf8Path, reason: &str) -> SyncError {
    SyncError::PlanConflict {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn claim(
    files: &mut BTreeSet<Utf8PathBuf>,
    dirs: &BTreeSet<Utf8PathBuf>,
    dest: &Utf8Path,
) -> Result<(), &'static str> {
    if files.contains(dest) {
        return Err("destination is still occupied");
    }
    if dirs.contains(dest) {
        return Err("destination is a directory");
    }
    if has_descendant(files, dest) {
        return Err("destination is a directory holding files");
    }
    if has_file_ancestor(files, dest).is_some() {
        return Err("a parent of the destination is a file");
    }
    files.insert(dest.to_path_buf());
    Ok(())
}
