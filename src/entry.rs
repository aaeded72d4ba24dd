use std::time::SystemTime;

use crate::error::WalkError;
use crate::key::{PathKey, RelPath};

/// A single filesystem object seen during a walk.
///
/// Entries are snapshots taken when the walker reached them and are never
/// mutated afterwards. The same type describes source and destination
/// objects; which tree it came from is known only by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Entry {
    /// Path from the tree root, original case preserved.
    pub path: RelPath,

    /// What kind of object this is.
    pub kind: EntryKind,

    /// Byte length for files and links, 0 for directories.
    pub size: u64,

    /// Last modification time as reported by the filesystem.
    pub modified: SystemTime,
}

impl Entry {
    pub fn key(&self) -> PathKey {
        self.path.key()
    }
}

/// The kind of a walked entry.
///
/// Only directories are ever descended into. Symlinks are reported as
/// themselves unless the walk follows links, in which case they take the
/// kind of their target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum EntryKind {
    /// A regular file.
    File,

    /// A directory.
    Directory,

    /// A symbolic link, copied as a link.
    Symlink,

    /// Anything else (device files, pipes, sockets, etc.).
    Other,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        self == Self::Directory
    }
}

/// One item of a walk: either an entry or a spot the walker could not read.
#[derive(Debug)]
pub enum WalkItem {
    Entry(Entry),

    /// `path` exists but could not be inspected or listed. When it names a
    /// directory whose listing failed, the directory itself was already
    /// yielded as an `Entry`.
    Unreadable { path: RelPath, error: WalkError },

    /// `path` matched an exclude pattern and was neither inspected nor
    /// descended into.
    Excluded(RelPath),
}

impl WalkItem {
    pub fn path(&self) -> &RelPath {
        match self {
            Self::Entry(e) => &e.path,
            Self::Unreadable { path, .. } | Self::Excluded(path) => path,
        }
    }
}
