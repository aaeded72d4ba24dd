use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::diff::diff;
use crate::engine::{execute, SyncOptions};
use crate::error::SyncError;
use crate::filter::Exclusions;
use crate::local::LocalFs;
use crate::plan::ActionPlan;
use crate::results::SyncResult;
use crate::traits::FileSystem;

// ---------------------------------------------------------------------------
// SyncBuilder
// ---------------------------------------------------------------------------

/// Entry point for configuring and executing a sync.
///
/// Created via [`treesync::sync()`](crate::sync). Configure with chained
/// builder methods, then call [`run()`](SyncBuilder::run) to apply, or
/// [`plan()`](SyncBuilder::plan) to only compute the changes.
///
/// # Example
///
/// ```rust,ignore
/// let result = treesync::sync()
///     .source("/srv/share/projects")
///     .destination("/backup/projects")
///     .exclude("*.tmp")
///     .threads(8)
///     .run()?;
///
/// if !result.is_success() {
///     std::process::exit(1);
/// }
/// ```
pub struct SyncBuilder {
    source:      Option<PathBuf>,
    destination: Option<PathBuf>,
    fs:          Arc<dyn FileSystem>,
    options:     SyncOptions,
    exclude:     Vec<String>,
}

impl Default for SyncBuilder {
    fn default() -> Self {
        Self {
            source:      None,
            destination: None,
            fs:          Arc::new(LocalFs::new()),
            options:     SyncOptions::default(),
            exclude:     Vec::new(),
        }
    }
}

impl SyncBuilder {
    // ── Roots ─────────────────────────────────────────────────────────────

    /// The authoritative tree.
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// The tree to bring in line with the source. Created if missing.
    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination = Some(path.into());
        self
    }

    /// Run against a custom [`FileSystem`] instead of the local disk.
    pub fn filesystem(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Arc::new(fs);
        self
    }

    // ── Options ───────────────────────────────────────────────────────────

    /// Compute the plan and report it without changing anything.
    pub fn dry_run(mut self, yes: bool) -> Self {
        self.options.dry_run = yes;
        self
    }

    /// Remove destination entries that are not in the source. On by default;
    /// turn off for an additive, one-directional copy.
    pub fn delete_extraneous(mut self, yes: bool) -> Self {
        self.options.delete_extraneous = yes;
        self
    }

    /// Traverse symlinks in the source instead of copying them as links.
    /// Off by default. Destination symlinks are never followed.
    pub fn follow_symlinks(mut self, yes: bool) -> Self {
        self.options.follow_symlinks = yes;
        self
    }

    /// How far apart two modification times may be and still count as equal.
    /// Defaults to one second, which absorbs the coarse timestamps of FAT and
    /// many network shares.
    pub fn tolerance(mut self, window: Duration) -> Self {
        self.options.tolerance = window;
        self
    }

    /// Number of threads for the walks and the executor. `1` (the default)
    /// runs everything on the calling thread.
    pub fn threads(mut self, n: usize) -> Self {
        self.options.threads = n;
        self
    }

    /// Use one thread per logical CPU core.
    pub fn parallel(self) -> Self {
        self.threads(num_cpus())
    }

    /// Leave paths matching this gitignore-style pattern out of both trees.
    /// May be called repeatedly.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    /// A flag the caller may set from another thread to stop the run between
    /// actions. The destination is left partially synced but never holds a
    /// half-written file.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.options.cancel = Some(flag);
        self
    }

    // ── Execute ───────────────────────────────────────────────────────────

    /// Walk both trees and return the plan without executing it.
    ///
    /// # Errors
    ///
    /// Returns `Err` for configuration errors and unusable roots.
    pub fn plan(self) -> Result<ActionPlan, SyncError> {
        let (fs, source, destination, options) = self.validate()?;
        diff(fs.as_ref(), &source, &destination, &options)
    }

    /// Walk both trees, plan, and apply the plan (unless this is a dry run).
    ///
    /// Blocks until the run completes or is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `Err` for fatal conditions only: missing or invalid
    /// configuration, an unusable root, thread pool failure. Per-path
    /// problems are collected into the [`SyncResult`].
    pub fn run(self) -> Result<SyncResult, SyncError> {
        let (fs, source, destination, options) = self.validate()?;
        let plan = diff(fs.as_ref(), &source, &destination, &options)?;
        execute(fs.as_ref(), plan, &source, &destination, &options)
    }

    fn validate(self) -> Result<(Arc<dyn FileSystem>, PathBuf, PathBuf, SyncOptions), SyncError> {
        let source = self.source.ok_or(SyncError::MissingSource)?;
        let destination = self.destination.ok_or(SyncError::MissingDestination)?;
        if self.options.threads == 0 {
            return Err(SyncError::InvalidThreadCount(0));
        }

        let mut options = self.options;
        options.exclusions = Exclusions::new(&self.exclude)?;
        Ok((self.fs, source, destination, options))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Get the logical CPU count, with a safe fallback.
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
