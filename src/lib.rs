//! # treesync
//!
//! One-way directory synchronization that decides what to copy from metadata
//! alone (size and modification time), so large trees on slow shares can be
//! diffed without reading file contents.
//!
//! treesync owns the tree walker, the difference engine, the plan, and the
//! executor. It does **not** own argument parsing, progress output, or the
//! raw filesystem: every read and write goes through the [`FileSystem`] trait,
//! with [`LocalFs`] as the std-backed implementation.
//!
//! # Quick Start
//!
//! ```rust
//! use std::fs;
//!
//! let src = tempfile::tempdir().unwrap();
//! let dst = tempfile::tempdir().unwrap();
//! fs::create_dir(src.path().join("docs")).unwrap();
//! fs::write(src.path().join("docs/readme.txt"), "hello").unwrap();
//! fs::write(dst.path().join("stale.txt"), "old").unwrap();
//!
//! let result = treesync::sync()
//!     .source(src.path())
//!     .destination(dst.path())
//!     .run()
//!     .unwrap();
//!
//! assert!(result.is_success());
//! assert_eq!(result.applied.created, 2);
//! assert_eq!(result.applied.deleted, 1);
//! assert!(dst.path().join("docs/readme.txt").exists());
//! assert!(!dst.path().join("stale.txt").exists());
//! ```
//!
//! # Dry Runs
//!
//! [`SyncBuilder::plan`] returns the [`ActionPlan`] without touching the
//! destination. It prints one line per change:
//!
//! ```rust
//! # use std::fs;
//! # let src = tempfile::tempdir().unwrap();
//! # let dst = tempfile::tempdir().unwrap();
//! fs::write(src.path().join("new.txt"), "x").unwrap();
//!
//! let plan = treesync::sync()
//!     .source(src.path())
//!     .destination(dst.path())
//!     .plan()
//!     .unwrap();
//!
//! assert_eq!(plan.to_string(), "create new.txt\n");
//! ```
//!
//! # Case Collisions
//!
//! Paths are matched through a case-folded [`PathKey`]. Two source names that
//! differ only in case (`Report.txt`, `report.txt`) cannot both live on a
//! case-insensitive destination, so they become an [`Action::Collision`] and
//! neither is copied. [`SyncResult::is_success`] reports `false` for them.
//!
//! # Custom Filesystems
//!
//! Implement [`FileSystem`] to sync through anything that looks like a tree:
//!
//! ```rust,ignore
//! use treesync::{FileSystem, FsError, Metadata, EntryKind};
//!
//! struct MountedShare { /* ... */ }
//!
//! impl FileSystem for MountedShare {
//!     fn list_children(&self, path: &Path) -> Result<Vec<(OsString, EntryKind)>, FsError> { /* ... */ }
//!     fn stat(&self, path: &Path, follow_links: bool) -> Result<Metadata, FsError> { /* ... */ }
//!     // copy_file, copy_symlink, make_directory, delete_file, delete_directory
//! }
//!
//! treesync::sync()
//!     .filesystem(MountedShare::connect()?)
//!     .source("/projects")
//!     .destination("/mirror/projects")
//!     .run()?;
//! ```

#![forbid(unsafe_code)]

pub mod engine;

mod builder;
mod diff;
mod entry;
mod error;
mod filter;
mod key;
mod local;
mod plan;
mod results;
mod traits;
mod walker;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use builder::SyncBuilder;
pub use diff::{diff, diff_walks};
pub use engine::{execute, SyncOptions, DEFAULT_TOLERANCE};
pub use entry::{Entry, EntryKind, WalkItem};
pub use error::{ExecutionError, FsError, SyncError, WalkError};
pub use filter::Exclusions;
pub use key::{PathKey, RelPath};
pub use local::LocalFs;
pub use plan::{Action, ActionPlan, ActionSummary, WalkFailure};
pub use results::{Failure, SyncResult};
pub use traits::{FileId, FileSystem, Metadata};
pub use walker::TreeWalker;

// ── Entry point ───────────────────────────────────────────────────────────────

/// Create a new [`SyncBuilder`] to configure and run a sync.
///
/// # Example
///
/// ```rust
/// # let src = tempfile::tempdir().unwrap();
/// # let dst = tempfile::tempdir().unwrap();
/// std::fs::write(src.path().join("a.txt"), "a").unwrap();
///
/// let first = treesync::sync().source(src.path()).destination(dst.path()).run().unwrap();
/// assert_eq!(first.applied.created, 1);
///
/// // Nothing changed in between: the second plan is all skips.
/// let second = treesync::sync().source(src.path()).destination(dst.path()).plan().unwrap();
/// assert!(second.is_noop());
/// ```
pub fn sync() -> SyncBuilder {
    SyncBuilder::default()
}
