//! The difference engine: joins a source walk and a destination walk by
//! [`PathKey`] and turns every key into exactly one [`Action`].
//!
//! Both walks are drained into one ordered index before classification.
//! The walkers emit siblings in raw-name order, which does not agree with
//! case-folded order (`"B" < "a"` but `"a" < "b"`), so a lock-step merge
//! could pair the wrong entries. The index costs memory proportional to both
//! trees; in exchange every key is classified with its full set of
//! candidates, which is what collision detection needs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::engine::SyncOptions;
use crate::entry::{Entry, WalkItem};
use crate::error::{FsError, SyncError, WalkError};
use crate::key::{PathKey, RelPath};
use crate::plan::{Action, ActionPlan, WalkFailure};
use crate::traits::FileSystem;
use crate::walker::TreeWalker;

// ---------------------------------------------------------------------------
// diff()
// ---------------------------------------------------------------------------

/// Walk both roots through `fs` and plan the changes that make `destination`
/// mirror `source`.
///
/// A missing destination root is treated as an empty tree; the executor
/// creates it. The destination walk never follows symlinks, whatever
/// `options.follow_symlinks` says, so nothing outside the destination tree
/// can end up in a delete.
///
/// # Errors
///
/// Only for an unusable root. Everything else lands in the plan.
pub fn diff<F: FileSystem + ?Sized>(
    fs: &F,
    source: &Path,
    destination: &Path,
    options: &SyncOptions,
) -> Result<ActionPlan, SyncError> {
    check_source_root(fs, source)?;
    let dest_present = check_destination_root(fs, destination)?;

    let src_walk = TreeWalker::new(fs, source, options.follow_symlinks, &options.exclusions);
    if !dest_present {
        debug!(destination = %destination.display(), "destination root missing, planning full copy");
        return diff_walks(src_walk, std::iter::empty(), options.tolerance);
    }
    let dst_walk = TreeWalker::new(fs, destination, false, &options.exclusions);

    if options.threads > 1 {
        let (src, dst) = rayon::join(
            || src_walk.collect::<Vec<_>>(),
            || dst_walk.collect::<Vec<_>>(),
        );
        diff_walks(src, dst, options.tolerance)
    } else {
        diff_walks(src_walk, dst_walk, options.tolerance)
    }
}

fn check_source_root<F: FileSystem + ?Sized>(fs: &F, root: &Path) -> Result<(), SyncError> {
    let meta = fs.stat(root, true).map_err(SyncError::SourceRoot)?;
    if !meta.kind.is_dir() {
        return Err(SyncError::SourceNotDirectory(root.to_path_buf()));
    }
    Ok(())
}

/// `Ok(false)` when the destination root does not exist yet.
pub(crate) fn check_destination_root<F: FileSystem + ?Sized>(
    fs: &F,
    root: &Path,
) -> Result<bool, SyncError> {
    match fs.stat(root, true) {
        Ok(meta) if meta.kind.is_dir() => Ok(true),
        Ok(_) => Err(SyncError::DestinationNotDirectory(root.to_path_buf())),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(SyncError::DestinationRoot(e)),
    }
}

// ---------------------------------------------------------------------------
// diff_walks()
// ---------------------------------------------------------------------------

/// Everything both walks reported under one key.
#[derive(Default)]
struct Slot {
    source:     Vec<Entry>,
    dest:       Vec<Entry>,
    /// The source walk could not read this path (or list it, for a directory).
    unreadable: bool,
    /// A destination directory here holds excluded entries, so it cannot be
    /// emptied and must stay.
    pinned:     bool,
}

/// Plan from two already-produced walks.
///
/// `source` and `dest` may be any sequences of [`WalkItem`]s with paths
/// relative to their roots. Files (and links) are unchanged when their sizes
/// match and their modification times are within `tolerance` of each other.
///
/// # Errors
///
/// [`SyncError::SourceRoot`] / [`SyncError::DestinationRoot`] when a walk
/// reports its root itself as unreadable.
pub fn diff_walks<S, D>(source: S, dest: D, tolerance: Duration) -> Result<ActionPlan, SyncError>
where
    S: IntoIterator<Item = WalkItem>,
    D: IntoIterator<Item = WalkItem>,
{
    let mut index: BTreeMap<PathKey, Slot> = BTreeMap::new();
    let mut failures = Vec::new();

    for item in source {
        match item {
            WalkItem::Entry(entry) => index.entry(entry.key()).or_default().source.push(entry),
            WalkItem::Unreadable { path, error } => {
                if path.is_root() {
                    return Err(SyncError::SourceRoot(root_error(error)));
                }
                index.entry(path.key()).or_default().unreadable = true;
                failures.push(WalkFailure { path, error, source: true });
            }
            WalkItem::Excluded(_) => {}
        }
    }
    for item in dest {
        match item {
            WalkItem::Entry(entry) => index.entry(entry.key()).or_default().dest.push(entry),
            WalkItem::Unreadable { path, error } => {
                if path.is_root() {
                    return Err(SyncError::DestinationRoot(root_error(error)));
                }
                failures.push(WalkFailure { path, error, source: false });
            }
            WalkItem::Excluded(path) => {
                for dir in path.key().ancestors() {
                    index.entry(dir).or_default().pinned = true;
                }
            }
        }
    }

    let mut classifier = Classifier::new(tolerance);
    for (key, slot) in index {
        classifier.classify(key, slot);
    }
    let plan = classifier.finish(failures);

    let summary = plan.summary();
    info!(
        create = summary.created,
        update = summary.updated,
        delete = summary.deleted,
        skip = summary.skipped,
        collisions = summary.collisions,
        unreadable = plan.failures.len(),
        "diff complete"
    );
    Ok(plan)
}

fn root_error(error: WalkError) -> FsError {
    match error {
        WalkError::Unreadable(e) => e,
        other => FsError::Io {
            path: Default::default(),
            source: std::io::Error::other(other.to_string()),
        },
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Walks the index in key order. Because a key sorts before all of its
/// descendants and subtrees are contiguous, "currently inside a collision" and
/// "currently under an unreadable source directory" are each a single prefix.
struct Classifier {
    tolerance: Duration,
    ordered:   Vec<Action>,
    /// Deletes in key order, with their keys.
    deletes:   Vec<(PathKey, Action)>,
    /// Destination spelling of every key that has (or will have) a
    /// destination location, so children are written beside their parents.
    targets:   HashMap<PathKey, RelPath>,
    /// Keys whose destination directory is being replaced by a non-directory.
    replaced:  BTreeSet<PathKey>,
    /// Open collision: its key and its position in `ordered`.
    collision: Option<(PathKey, usize)>,
    /// Open unreadable source prefix.
    shield:    Option<PathKey>,
}

impl Classifier {
    fn new(tolerance: Duration) -> Self {
        Self {
            tolerance,
            ordered: Vec::new(),
            deletes: Vec::new(),
            targets: HashMap::new(),
            replaced: BTreeSet::new(),
            collision: None,
            shield: None,
        }
    }

    fn classify(&mut self, key: PathKey, slot: Slot) {
        if self.collision.as_ref().is_some_and(|(c, _)| !c.contains(&key)) {
            self.collision = None;
        }
        if self.shield.as_ref().is_some_and(|s| !s.contains(&key)) {
            self.shield = None;
        }

        // Inside a collision: nothing is acted on, everything is reported.
        if let Some((_, at)) = &self.collision {
            if let Some(Action::Collision { shadowed, .. }) = self.ordered.get_mut(*at) {
                shadowed.extend(slot.source.into_iter().map(|e| e.path));
                shadowed.extend(slot.dest.into_iter().map(|e| e.path));
            }
            return;
        }

        if slot.source.len() > 1 {
            let paths: Vec<RelPath> = slot.source.into_iter().map(|e| e.path).collect();
            let shadowed: Vec<RelPath> = slot.dest.into_iter().map(|e| e.path).collect();
            let shown: Vec<String> = paths.iter().map(ToString::to_string).collect();
            warn!(key = %key, paths = ?shown, "case collision in source");
            self.collision = Some((key.clone(), self.ordered.len()));
            self.ordered.push(Action::Collision { key, paths, shadowed });
            return;
        }

        if slot.unreadable && self.shield.is_none() {
            self.shield = Some(key.clone());
        }

        let parent_target = match key.parent() {
            Some(parent) if parent.depth() > 0 => self.targets.get(&parent).cloned(),
            _ => Some(RelPath::root()),
        };

        let source = slot.source.into_iter().next();
        let mut dest = slot.dest;

        // Pick the destination counterpart: it must sit in the directory the
        // source entry is headed for; an exact spelling match wins.
        let counterpart = match (&source, &parent_target) {
            (Some(src), Some(parent)) => {
                let name = src.path.name().unwrap_or_default();
                let beside = |e: &Entry| e.path.parent().as_ref() == Some(parent);
                dest.iter()
                    .position(|e| beside(e) && e.path.name() == Some(name))
                    .or_else(|| dest.iter().position(beside))
                    .map(|i| dest.remove(i))
            }
            _ => None,
        };

        // Whatever destination entries remain under this key are extraneous.
        for extra in dest {
            if self.shield.is_some() || (slot.pinned && extra.kind.is_dir()) {
                self.ordered.push(Action::Skip(extra.path));
            } else {
                self.deletes.push((key.clone(), Action::Delete { path: extra.path, kind: extra.kind }));
            }
        }

        let Some(src) = source else {
            return;
        };

        let target = match (&counterpart, &parent_target) {
            (Some(dst), _) => dst.path.clone(),
            (None, Some(parent)) => parent.join(src.path.name().unwrap_or_default()),
            (None, None) => src.path.clone(),
        };
        self.targets.insert(key.clone(), target.clone());

        let action = match counterpart {
            None => Action::Create { entry: src, target },
            Some(dst) if dst.kind.is_dir() && !src.kind.is_dir() && slot.pinned => {
                warn!(path = %target, "directory holds excluded entries, not replaced");
                Action::Skip(target)
            }
            Some(dst) if dst.kind != src.kind => {
                if dst.kind.is_dir() {
                    self.replaced.insert(key);
                }
                Action::Update { entry: src, target, existing: dst.kind }
            }
            Some(_) if src.kind.is_dir() => Action::Skip(target),
            Some(dst) if self.is_changed(&src, &dst) => {
                debug!(path = %target, "changed");
                Action::Update { entry: src, target, existing: dst.kind }
            }
            Some(_) => Action::Skip(target),
        };
        self.ordered.push(action);
    }

    fn is_changed(&self, src: &Entry, dst: &Entry) -> bool {
        src.size != dst.size || drift(src.modified, dst.modified) > self.tolerance
    }

    /// Interleave deletes into the ordered actions: those clearing a replaced
    /// directory go right before its update, the rest go last. Both groups
    /// are emitted deepest first.
    fn finish(self, failures: Vec<WalkFailure>) -> ActionPlan {
        let mut hoisted: HashMap<PathKey, Vec<Action>> = HashMap::new();
        let mut trailing = Vec::new();

        for (key, action) in self.deletes.into_iter().rev() {
            match replaced_ancestor(&self.replaced, &key) {
                Some(owner) => hoisted.entry(owner).or_default().push(action),
                None => trailing.push(action),
            }
        }

        let mut actions = Vec::with_capacity(self.ordered.len() + trailing.len());
        for action in self.ordered {
            if action.replaces_directory() {
                if let Some(clearing) = hoisted.remove(&action.key()) {
                    actions.extend(clearing);
                }
            }
            actions.push(action);
        }
        actions.extend(trailing);

        ActionPlan { actions, failures }
    }
}

/// The nearest strict ancestor of `key` that is in `replaced`.
fn replaced_ancestor(replaced: &BTreeSet<PathKey>, key: &PathKey) -> Option<PathKey> {
    if replaced.is_empty() {
        return None;
    }
    key.ancestors().find(|k| replaced.contains(k))
}

/// Absolute difference between two timestamps.
fn drift(a: SystemTime, b: SystemTime) -> Duration {
    match a.duration_since(b) {
        Ok(d) => d,
        Err(e) => e.duration(),
    }
}
