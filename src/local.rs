use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use filetime::FileTime;

use crate::entry::EntryKind;
use crate::error::FsError;
use crate::traits::{FileId, FileSystem, Metadata};

/// Prefix of the temporary names copies are staged under before the rename.
const TEMP_PREFIX: &str = ".treesync-";

/// [`FileSystem`] over the local disk (or anything mounted into it).
///
/// Copies are staged in a temporary file next to the destination and renamed
/// into place, so an interrupted run leaves either the old file or the new
/// one, never a truncated mix.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFs {
    fn list_children(&self, path: &Path) -> Result<Vec<(OsString, EntryKind)>, FsError> {
        let dir = fs::read_dir(path).map_err(|e| FsError::from_io(path, e))?;

        let mut children = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| FsError::from_io(path, e))?;
            let ft = entry
                .file_type()
                .map_err(|e| FsError::from_io(entry.path(), e))?;
            children.push((entry.file_name(), kind_of(ft)));
        }
        Ok(children)
    }

    fn stat(&self, path: &Path, follow_links: bool) -> Result<Metadata, FsError> {
        let meta = if follow_links {
            fs::metadata(path)
        } else {
            fs::symlink_metadata(path)
        }
        .map_err(|e| FsError::from_io(path, e))?;

        let kind = kind_of(meta.file_type());
        let modified = meta.modified().map_err(|e| FsError::from_io(path, e))?;

        Ok(Metadata {
            kind,
            size: if kind.is_dir() { 0 } else { meta.len() },
            modified,
            id: file_id(&meta),
        })
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> Result<u64, FsError> {
        let parent = dst
            .parent()
            .ok_or_else(|| FsError::NotFound(dst.to_path_buf()))?;

        let mut reader = File::open(src).map_err(|e| FsError::from_io(src, e))?;
        let src_meta = reader.metadata().map_err(|e| FsError::from_io(src, e))?;

        let mut staged = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(parent)
            .map_err(|e| FsError::from_io(parent, e))?;

        let bytes = io::copy(&mut reader, staged.as_file_mut())
            .map_err(|e| FsError::from_io(dst, e))?;

        let atime = FileTime::from_last_access_time(&src_meta);
        let mtime = FileTime::from_last_modification_time(&src_meta);
        filetime::set_file_handle_times(staged.as_file(), Some(atime), Some(mtime))
            .map_err(|e| FsError::from_io(dst, e))?;
        staged
            .as_file()
            .set_permissions(src_meta.permissions())
            .map_err(|e| FsError::from_io(dst, e))?;

        // Dropping `staged` on any error above removes the temporary file.
        staged
            .persist(dst)
            .map_err(|e| FsError::from_io(dst, e.error))?;

        Ok(bytes)
    }

    fn copy_symlink(&self, src: &Path, dst: &Path) -> Result<(), FsError> {
        let parent = dst
            .parent()
            .ok_or_else(|| FsError::NotFound(dst.to_path_buf()))?;

        let target = fs::read_link(src).map_err(|e| FsError::from_io(src, e))?;
        let src_meta = fs::symlink_metadata(src).map_err(|e| FsError::from_io(src, e))?;
        let target_is_dir = fs::metadata(src).map(|m| m.is_dir()).unwrap_or(false);

        let staged = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .make_in(parent, |path| make_symlink(&target, path, target_is_dir))
            .map_err(|e| FsError::from_io(parent, e))?;

        let atime = FileTime::from_last_access_time(&src_meta);
        let mtime = FileTime::from_last_modification_time(&src_meta);
        filetime::set_symlink_file_times(staged.path(), atime, mtime)
            .map_err(|e| FsError::from_io(dst, e))?;

        staged
            .persist(dst)
            .map_err(|e| FsError::from_io(dst, e.error))?;
        Ok(())
    }

    fn make_directory(&self, path: &Path) -> Result<(), FsError> {
        match fs::create_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
            Err(e) => Err(FsError::from_io(path, e)),
        }
    }

    fn delete_file(&self, path: &Path) -> Result<(), FsError> {
        fs::remove_file(path).map_err(|e| FsError::from_io(path, e))
    }

    fn delete_directory(&self, path: &Path) -> Result<(), FsError> {
        fs::remove_dir(path).map_err(|e| FsError::from_io(path, e))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn kind_of(ft: fs::FileType) -> EntryKind {
    if ft.is_dir() {
        EntryKind::Directory
    } else if ft.is_file() {
        EntryKind::File
    } else if ft.is_symlink() {
        EntryKind::Symlink
    } else {
        EntryKind::Other
    }
}

#[cfg(unix)]
fn file_id(meta: &fs::Metadata) -> Option<FileId> {
    use std::os::unix::fs::MetadataExt;
    Some(FileId {
        device: meta.dev(),
        inode:  meta.ino(),
    })
}

#[cfg(not(unix))]
fn file_id(_meta: &fs::Metadata) -> Option<FileId> {
    None
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path, _target_is_dir: bool) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path, target_is_dir: bool) -> io::Result<()> {
    if target_is_dir {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

#[cfg(not(any(unix, windows)))]
fn make_symlink(_target: &Path, _link: &Path, _target_is_dir: bool) -> io::Result<()> {
    Err(io::ErrorKind::Unsupported.into())
}
