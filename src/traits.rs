use std::ffi::OsString;
use std::path::Path;
use std::time::SystemTime;

use crate::entry::EntryKind;
use crate::error::FsError;

/// Identity of a filesystem object (device, inode), used for loop detection
/// when the walker follows symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    pub device: u64,
    pub inode:  u64,
}

/// What `stat` reports about one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub kind:     EntryKind,
    pub size:     u64,
    pub modified: SystemTime,
    /// `None` when the filesystem cannot tell.
    pub id:       Option<FileId>,
}

/// The filesystem capability treesync runs against.
///
/// Everything the walker and the executor do to a tree goes through these
/// operations, so the engine can run over local disks, mounted shares, or an
/// in-memory tree in tests. [`LocalFs`](crate::LocalFs) is the std-backed
/// implementation.
///
/// # Thread Safety
///
/// `Send + Sync` are required: with `threads > 1` the two walks and the
/// executor's workers share one handle.
///
/// # Error Handling
///
/// Map missing paths to [`FsError::NotFound`] and permission failures to
/// [`FsError::AccessDenied`]; the engine relies on `NotFound` to detect a
/// missing destination root and missing parents.
///
/// # Example
///
/// ```rust,ignore
/// use treesync::{FileSystem, LocalFs};
///
/// let fs = LocalFs::new();
/// for (name, kind) in fs.list_children("/etc".as_ref())? {
///     println!("{name:?} {kind:?}");
/// }
/// ```
pub trait FileSystem: Send + Sync {
    /// List the names and kinds of the direct children of `path`.
    /// Order does not matter; the walker sorts.
    fn list_children(&self, path: &Path) -> Result<Vec<(OsString, EntryKind)>, FsError>;

    /// Inspect `path`. With `follow_links` a symlink reports its target;
    /// without it, the link itself.
    fn stat(&self, path: &Path, follow_links: bool) -> Result<Metadata, FsError>;

    /// Copy the bytes and modification time of `src` to `dst`, replacing any
    /// file already there. Implementations must never leave a partially
    /// written `dst` behind. Returns the number of bytes copied.
    fn copy_file(&self, src: &Path, dst: &Path) -> Result<u64, FsError>;

    /// Recreate the symlink `src` at `dst` with the same target.
    fn copy_symlink(&self, src: &Path, dst: &Path) -> Result<(), FsError>;

    /// Create one directory. Fails if the parent is missing.
    fn make_directory(&self, path: &Path) -> Result<(), FsError>;

    /// Remove a file or symlink.
    fn delete_file(&self, path: &Path) -> Result<(), FsError>;

    /// Remove an empty directory. Callers guarantee emptiness.
    fn delete_directory(&self, path: &Path) -> Result<(), FsError>;
}
