use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::diff::check_destination_root;
use crate::entry::{Entry, EntryKind};
use crate::error::{ExecutionError, FsError, SyncError};
use crate::filter::Exclusions;
use crate::key::{PathKey, RelPath};
use crate::plan::{Action, ActionPlan, ActionSummary};
use crate::results::{Failure, SyncResult};
use crate::traits::FileSystem;

/// Default window within which two modification times count as equal.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// SyncOptions
// ---------------------------------------------------------------------------

/// Knobs shared by the diff and the executor.
///
/// Callers usually set these through the builder (`.dry_run()`,
/// `.delete_extraneous()`, ...); the struct is public so the lower-level
/// [`diff`](crate::diff) and [`execute`] functions can be driven directly.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Plan only; touch nothing.
    pub dry_run: bool,

    /// Remove destination entries missing from the source. When `false`,
    /// extraneous deletes are kept in the plan but not run.
    pub delete_extraneous: bool,

    /// Traverse symlinks in the source instead of copying them as links.
    pub follow_symlinks: bool,

    /// Modification times closer than this are considered equal.
    pub tolerance: Duration,

    /// `1` runs everything on the calling thread. More walks both trees in
    /// parallel and executes independent actions on a pool of this size.
    pub threads: usize,

    /// Paths left out of both walks.
    pub exclusions: Exclusions,

    /// Checked before every action; once set, remaining actions are not run.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run:           false,
            delete_extraneous: true,
            follow_symlinks:   false,
            tolerance:         DEFAULT_TOLERANCE,
            threads:           1,
            exclusions:        Exclusions::none(),
            cancel:            None,
        }
    }
}

impl SyncOptions {
    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// execute()
// ---------------------------------------------------------------------------

/// Apply `plan` to `destination`, reading new content from `source`.
///
/// Actions run in plan order, or in dependency waves when
/// `options.threads > 1`. A failing action is recorded and the run goes on;
/// actions that depend on it are recorded as
/// [`ExecutionError::DependencyFailed`] without touching the disk.
///
/// # Errors
///
/// Only when the destination root is unusable, or the worker pool cannot be
/// built. With `dry_run` nothing is checked and nothing fails.
pub fn execute<F: FileSystem + ?Sized>(
    fs: &F,
    plan: ActionPlan,
    source: &Path,
    destination: &Path,
    options: &SyncOptions,
) -> Result<SyncResult, SyncError> {
    let start = Instant::now();

    if options.dry_run {
        info!(actions = plan.len(), "dry run, nothing applied");
        return Ok(SyncResult::dry_run(plan, start.elapsed()));
    }

    if !check_destination_root(fs, destination)? {
        debug!(destination = %destination.display(), "creating destination root");
        make_dirs(fs, destination).map_err(SyncError::DestinationRoot)?;
    }

    let graph = DependencyGraph::build(plan.actions());
    let ledger = Ledger::new(plan.len());
    let roots = Roots { source, destination };

    let run_one = |i: usize| run_action(fs, plan.actions(), i, &graph, &ledger, &roots, options);

    if options.threads > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build()
            .map_err(|e| SyncError::ThreadPool(e.to_string()))?;
        let waves = graph.waves(plan.actions());
        debug!(waves = waves.len(), threads = options.threads, "executing in waves");
        pool.install(|| {
            for wave in &waves {
                wave.par_iter().for_each(|&i| run_one(i));
            }
        });
    } else {
        (0..plan.len()).for_each(run_one);
    }

    let result = ledger.finish(plan, start.elapsed());
    info!(
        created = result.applied.created,
        updated = result.applied.updated,
        deleted = result.applied.deleted,
        failed = result.failures.len(),
        not_run = result.not_run,
        bytes = result.bytes_copied,
        "sync complete"
    );
    Ok(result)
}

struct Roots<'a> {
    source:      &'a Path,
    destination: &'a Path,
}

// ---------------------------------------------------------------------------
// Ledger: the append-only result accumulator shared by workers
// ---------------------------------------------------------------------------

struct Ledger {
    failed:      Vec<AtomicBool>,
    failures:    Mutex<Vec<Failure>>,
    applied:     Mutex<ActionSummary>,
    retained:    AtomicUsize,
    unsupported: AtomicUsize,
    not_run:     AtomicUsize,
    bytes:       AtomicU64,
    cancelled:   AtomicBool,
}

impl Ledger {
    fn new(len: usize) -> Self {
        Self {
            failed:      (0..len).map(|_| AtomicBool::new(false)).collect(),
            failures:    Mutex::new(Vec::new()),
            applied:     Mutex::new(ActionSummary::default()),
            retained:    AtomicUsize::new(0),
            unsupported: AtomicUsize::new(0),
            not_run:     AtomicUsize::new(0),
            bytes:       AtomicU64::new(0),
            cancelled:   AtomicBool::new(false),
        }
    }

    fn fail(&self, index: usize, path: RelPath, error: ExecutionError) {
        warn!(path = %path, error = %error, "action failed");
        self.failed[index].store(true, Ordering::Release);
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(Failure { path, error });
        }
    }

    fn applied(&self, action: &Action) {
        if let Ok(mut applied) = self.applied.lock() {
            applied.record(action);
        }
    }

    fn finish(self, plan: ActionPlan, duration: Duration) -> SyncResult {
        let planned = plan.summary();
        let mut failures = self.failures.into_inner().unwrap_or_default();
        // Workers append in completion order; report in path order.
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        SyncResult {
            dry_run:      false,
            planned,
            applied:      self.applied.into_inner().unwrap_or_default(),
            failures,
            retained:     self.retained.into_inner(),
            unsupported:  self.unsupported.into_inner(),
            not_run:      self.not_run.into_inner(),
            cancelled:    self.cancelled.into_inner(),
            bytes_copied: self.bytes.into_inner(),
            duration,
            plan,
        }
    }
}

// ---------------------------------------------------------------------------
// DependencyGraph
// ---------------------------------------------------------------------------

/// Which actions must finish before which, derived from path prefixes.
///
/// - a create/update waits for the create/update of its parent directory;
/// - a directory delete waits for the deletes of its direct children;
/// - an update replacing a directory waits for the deletes emptying it.
///
/// Dependencies always point backwards in plan order, so running the plan
/// front to back satisfies them, and so does running it wave by wave.
struct DependencyGraph {
    deps:     Vec<Vec<usize>>,
    /// Deletes that must run even when extraneous deletes are disabled.
    required: Vec<bool>,
}

impl DependencyGraph {
    fn build(actions: &[Action]) -> Self {
        let replaced: HashSet<PathKey> = actions
            .iter()
            .filter(|a| a.replaces_directory())
            .map(Action::key)
            .collect();

        let mut deps = vec![Vec::new(); actions.len()];
        let mut required = vec![false; actions.len()];
        let mut writers: HashMap<PathKey, usize> = HashMap::new();
        let mut child_deletes: HashMap<PathKey, Vec<usize>> = HashMap::new();

        for (i, action) in actions.iter().enumerate() {
            let key = action.key();
            match action {
                Action::Create { .. } | Action::Update { .. } => {
                    if let Some(&parent) = key.parent().and_then(|p| writers.get(&p)) {
                        deps[i].push(parent);
                    }
                    if action.replaces_directory() {
                        if let Some(children) = child_deletes.remove(&key) {
                            deps[i].extend(children);
                        }
                    }
                    writers.insert(key, i);
                }
                Action::Delete { .. } => {
                    if let Some(children) = child_deletes.remove(&key) {
                        deps[i].extend(children);
                    }
                    required[i] = key.ancestors().any(|k| replaced.contains(&k));
                    if let Some(parent) = key.parent() {
                        child_deletes.entry(parent).or_default().push(i);
                    }
                }
                Action::Skip(_) | Action::Collision { .. } => {}
            }
        }

        Self { deps, required }
    }

    /// Group action indices so that every dependency of an action sits in an
    /// earlier group. Within a group the largest copies come first, so long
    /// transfers start early and small ones fill in around them.
    fn waves(&self, actions: &[Action]) -> Vec<Vec<usize>> {
        let mut level = vec![0usize; self.deps.len()];
        let mut waves: Vec<Vec<usize>> = Vec::new();
        for i in 0..self.deps.len() {
            level[i] = self.deps[i].iter().map(|&d| level[d] + 1).max().unwrap_or(0);
            if waves.len() <= level[i] {
                waves.resize_with(level[i] + 1, Vec::new);
            }
            waves[level[i]].push(i);
        }
        for wave in &mut waves {
            wave.sort_by_key(|&i| Reverse(actions[i].entry().map_or(0, |e| e.size)));
        }
        waves
    }
}

// ---------------------------------------------------------------------------
// Running one action
// ---------------------------------------------------------------------------

fn run_action<F: FileSystem + ?Sized>(
    fs: &F,
    actions: &[Action],
    index: usize,
    graph: &DependencyGraph,
    ledger: &Ledger,
    roots: &Roots<'_>,
    options: &SyncOptions,
) {
    let action = &actions[index];
    let path = match action {
        Action::Skip(_) => {
            ledger.applied(action);
            return;
        }
        Action::Collision { .. } => return,
        Action::Delete { path, .. }
            if !options.delete_extraneous && !graph.required[index] =>
        {
            debug!(path = %path, "keeping extraneous entry");
            ledger.retained.fetch_add(1, Ordering::Relaxed);
            return;
        }
        other => other.path().cloned().unwrap_or_default(),
    };

    if options.is_cancelled() {
        ledger.cancelled.store(true, Ordering::Relaxed);
        ledger.not_run.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let failed_dep = graph.deps[index]
        .iter()
        .find(|&&d| ledger.failed[d].load(Ordering::Acquire));
    if let Some(&dep) = failed_dep {
        let blocker = actions[dep].path().cloned().unwrap_or_default();
        ledger.fail(index, path, ExecutionError::DependencyFailed(blocker));
        return;
    }

    match apply(fs, action, roots) {
        Ok(Outcome::Done(bytes)) => {
            debug!(action = %action, "applied");
            ledger.bytes.fetch_add(bytes, Ordering::Relaxed);
            ledger.applied(action);
        }
        Ok(Outcome::Unsupported(kind)) => {
            warn!(path = %path, kind = ?kind, "cannot reproduce special file, skipped");
            ledger.unsupported.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => ledger.fail(index, path, e),
    }
}

enum Outcome {
    /// Finished; bytes of file content written.
    Done(u64),
    /// The source entry is a kind that cannot be recreated.
    Unsupported(EntryKind),
}

fn apply<F: FileSystem + ?Sized>(
    fs: &F,
    action: &Action,
    roots: &Roots<'_>,
) -> Result<Outcome, ExecutionError> {
    match action {
        Action::Create { entry, target } => write_entry(fs, entry, target, roots),
        Action::Update { entry, target, existing } => {
            if *existing != entry.kind {
                remove(fs, &target.to_path(roots.destination), *existing)?;
            }
            write_entry(fs, entry, target, roots)
        }
        Action::Delete { path, kind } => {
            remove(fs, &path.to_path(roots.destination), *kind)?;
            Ok(Outcome::Done(0))
        }
        Action::Skip(_) | Action::Collision { .. } => Ok(Outcome::Done(0)),
    }
}

fn write_entry<F: FileSystem + ?Sized>(
    fs: &F,
    entry: &Entry,
    target: &RelPath,
    roots: &Roots<'_>,
) -> Result<Outcome, ExecutionError> {
    if entry.kind == EntryKind::Other {
        return Ok(Outcome::Unsupported(entry.kind));
    }

    let src = entry.path.to_path(roots.source);
    let dst = target.to_path(roots.destination);

    let write = || -> Result<u64, FsError> {
        match entry.kind {
            EntryKind::Directory => fs.make_directory(&dst).map(|()| 0),
            EntryKind::Symlink => fs.copy_symlink(&src, &dst).map(|()| entry.size),
            EntryKind::File | EntryKind::Other => fs.copy_file(&src, &dst),
        }
    };

    match write() {
        Ok(bytes) => Ok(Outcome::Done(bytes)),
        // The parent may be missing if it was removed behind our back or the
        // plan was built by hand; recreate it and try once more.
        Err(e) if e.is_not_found() && parent_missing(fs, &dst) => {
            if let Some(parent) = target.parent() {
                ensure_dir(fs, roots.destination, &parent)?;
            }
            Ok(Outcome::Done(write()?))
        }
        Err(e) => Err(e.into()),
    }
}

fn parent_missing<F: FileSystem + ?Sized>(fs: &F, dst: &Path) -> bool {
    match dst.parent() {
        Some(parent) => matches!(fs.stat(parent, false), Err(e) if e.is_not_found()),
        None => false,
    }
}

/// Remove one destination object of the given kind. Already gone is fine.
fn remove<F: FileSystem + ?Sized>(fs: &F, path: &Path, kind: EntryKind) -> Result<(), FsError> {
    let result = if kind.is_dir() {
        fs.delete_directory(path)
    } else {
        fs.delete_file(path)
    };
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Create every missing directory of `dir` beneath `root`, one level at a time.
/// Existing symlinks are not treated as directories.
fn ensure_dir<F: FileSystem + ?Sized>(
    fs: &F,
    root: &Path,
    dir: &RelPath,
) -> Result<(), ExecutionError> {
    let mut current = RelPath::root();
    for segment in dir.segments() {
        current = current.join(segment.as_str());
        let path = current.to_path(root);
        match fs.stat(&path, false) {
            Ok(meta) if meta.kind.is_dir() => {}
            Ok(_) => return Err(ExecutionError::NotADirectory(path)),
            Err(e) if e.is_not_found() => fs.make_directory(&path)?,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// `mkdir -p` for the destination root itself.
fn make_dirs<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> Result<(), FsError> {
    match fs.make_directory(path) {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => match path.parent() {
            Some(parent) if parent != path && !parent.as_os_str().is_empty() => {
                make_dirs(fs, parent)?;
                fs.make_directory(path)
            }
            _ => Err(e),
        },
        Err(e) => Err(e),
    }
}
