use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::entry::{Entry, EntryKind, WalkItem};
use crate::error::{FsError, WalkError};
use crate::filter::Exclusions;
use crate::key::RelPath;
use crate::traits::{FileId, FileSystem, Metadata};

/// One directory whose children are being yielded.
struct Frame {
    dir:      RelPath,
    id:       Option<FileId>,
    children: std::vec::IntoIter<(OsString, EntryKind)>,
}

/// Lazy depth-first walk of one tree.
///
/// Yields every entry beneath `root` (not the root itself), each directory
/// before its contents, siblings sorted by raw name. Each directory is listed
/// exactly once, when the walk first descends into it, so memory is bounded
/// by depth times the widest directory rather than by tree size.
///
/// The walk is single-pass; build a second walker to walk again. Failures are
/// yielded as [`WalkItem::Unreadable`] and the walk carries on with the next
/// sibling. Excluded paths are yielded as [`WalkItem::Excluded`] markers
/// without being inspected.
pub struct TreeWalker<'a, F: FileSystem + ?Sized> {
    fs:           &'a F,
    root:         PathBuf,
    follow_links: bool,
    exclusions:   &'a Exclusions,
    stack:        Vec<Frame>,
    /// Directory yielded last whose listing is still due.
    pending:      Option<(RelPath, Option<FileId>)>,
    started:      bool,
}

impl<'a, F: FileSystem + ?Sized> TreeWalker<'a, F> {
    pub fn new(fs: &'a F, root: impl Into<PathBuf>, follow_links: bool, exclusions: &'a Exclusions) -> Self {
        Self {
            fs,
            root: root.into(),
            follow_links,
            exclusions,
            stack: Vec::new(),
            pending: None,
            started: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stat(&self, path: &RelPath, listed: EntryKind) -> Result<Metadata, FsError> {
        let full = path.to_path(&self.root);
        if self.follow_links && listed == EntryKind::Symlink {
            // A dangling link is still copied as a link.
            self.fs
                .stat(&full, true)
                .or_else(|_| self.fs.stat(&full, false))
        } else {
            self.fs.stat(&full, false)
        }
    }

    fn is_loop(&self, id: Option<FileId>) -> bool {
        match id {
            Some(id) => self.stack.iter().any(|frame| frame.id == Some(id)),
            None => false,
        }
    }

    /// List `dir` and push it as the new innermost frame.
    fn descend(&mut self, dir: RelPath, id: Option<FileId>) -> Result<(), WalkItem> {
        match self.fs.list_children(&dir.to_path(&self.root)) {
            Ok(mut children) => {
                children.sort_by(|a, b| a.0.cmp(&b.0));
                debug!(dir = %dir, children = children.len(), "listed directory");
                self.stack.push(Frame { dir, id, children: children.into_iter() });
                Ok(())
            }
            Err(e) => {
                warn!(dir = %dir, error = %e, "cannot list directory");
                Err(WalkItem::Unreadable { path: dir, error: e.into() })
            }
        }
    }
}

impl<F: FileSystem + ?Sized> Iterator for TreeWalker<'_, F> {
    type Item = WalkItem;

    fn next(&mut self) -> Option<WalkItem> {
        if !self.started {
            self.started = true;
            let id = if self.follow_links {
                self.fs.stat(&self.root, true).ok().and_then(|m| m.id)
            } else {
                None
            };
            self.pending = Some((RelPath::root(), id));
        }

        loop {
            if let Some((dir, id)) = self.pending.take() {
                if let Err(item) = self.descend(dir, id) {
                    return Some(item);
                }
            }

            let frame = self.stack.last_mut()?;
            let Some((name, listed)) = frame.children.next() else {
                self.stack.pop();
                continue;
            };
            let parent = frame.dir.clone();

            let path = match name.into_string() {
                Ok(name) => parent.join(name),
                Err(raw) => {
                    let path = parent.join(raw.to_string_lossy());
                    warn!(path = %path, "skipping name that is not valid UTF-8");
                    return Some(WalkItem::Unreadable { path, error: WalkError::InvalidName(raw) });
                }
            };

            if self.exclusions.is_excluded(&path, listed.is_dir()) {
                debug!(path = %path, "excluded");
                return Some(WalkItem::Excluded(path));
            }

            let meta = match self.stat(&path, listed) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(path = %path, error = %e, "cannot stat entry");
                    return Some(WalkItem::Unreadable { path, error: e.into() });
                }
            };

            if meta.kind.is_dir() {
                if self.follow_links && self.is_loop(meta.id) {
                    warn!(path = %path, "symlink loop");
                    return Some(WalkItem::Unreadable { path, error: WalkError::SymlinkLoop });
                }
                self.pending = Some((path.clone(), meta.id));
            }

            return Some(WalkItem::Entry(Entry {
                path,
                kind: meta.kind,
                size: meta.size,
                modified: meta.modified,
            }));
        }
    }
}
