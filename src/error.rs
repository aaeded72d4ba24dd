use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::key::RelPath;

// ---------------------------------------------------------------------------
// FsError: failures reported by a FileSystem implementation
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum FsError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("access denied: {}", .0.display())]
    AccessDenied(PathBuf),

    #[error("operation not supported: {}", .0.display())]
    Unsupported(PathBuf),

    #[error("IO error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Classify a raw `io::Error` raised while touching `path`.
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound         => Self::NotFound(path),
            io::ErrorKind::PermissionDenied => Self::AccessDenied(path),
            io::ErrorKind::Unsupported      => Self::Unsupported(path),
            _ => Self::Io { path, source: err },
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p)
            | Self::AccessDenied(p)
            | Self::Unsupported(p)
            | Self::Io { path: p, .. } => p,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ---------------------------------------------------------------------------
// WalkError: per-entry traversal failures, recovered by the walker
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("unreadable entry")]
    Unreadable(#[from] FsError),

    #[error("name is not valid UTF-8: {0:?}")]
    InvalidName(OsString),

    #[error("symlink loop")]
    SymlinkLoop,
}

// ---------------------------------------------------------------------------
// ExecutionError: per-action failures, recovered by the executor
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("skipped because {0} could not be synchronized")]
    DependencyFailed(RelPath),

    #[error("parent path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

// ---------------------------------------------------------------------------
// SyncError: fatal conditions that abort the whole run
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum SyncError {
    // Roots
    #[error("source root is not accessible")]
    SourceRoot(#[source] FsError),

    #[error("destination root is not accessible")]
    DestinationRoot(#[source] FsError),

    #[error("source root is not a directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),

    #[error("destination root is not a directory: {}", .0.display())]
    DestinationNotDirectory(PathBuf),

    // Config
    #[error("no source provided")]
    MissingSource,

    #[error("no destination provided")]
    MissingDestination,

    #[error("invalid exclude pattern")]
    InvalidPattern(String),

    #[error("invalid thread count")]
    InvalidThreadCount(usize),

    // Runtime
    #[error("thread pool failure")]
    ThreadPool(String),
}

impl SyncError {
    /// The root path this error concerns, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::SourceRoot(e) | Self::DestinationRoot(e) => Some(e.path()),
            Self::SourceNotDirectory(p) | Self::DestinationNotDirectory(p) => Some(p),
            _ => None,
        }
    }
}
