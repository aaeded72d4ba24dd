//! In-memory `FileSystem` for tests that need case collisions, denied
//! operations, or an exact record of the order of writes.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use treesync::{EntryKind, FileSystem, FsError, Metadata};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    File { data: Vec<u8>, modified: SystemTime },
    Dir,
    Link { target: PathBuf, modified: SystemTime },
}

#[derive(Default)]
struct Inner {
    nodes:  Mutex<BTreeMap<PathBuf, Node>>,
    /// Writes (copy target, mkdir, delete) on these paths are refused.
    denied: Mutex<HashSet<PathBuf>>,
    /// Listing these directories is refused.
    locked: Mutex<HashSet<PathBuf>>,
    ops:    Mutex<Vec<String>>,
    /// Raise this flag once this many mutations have completed.
    trip:   Mutex<Option<(usize, Arc<AtomicBool>)>>,
}

/// Cheap handle; clones share the same tree.
#[derive(Clone, Default)]
pub struct MemFs {
    inner: Arc<Inner>,
}

pub fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

impl MemFs {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.dir("/");
        fs
    }

    pub fn dir(&self, path: &str) -> &Self {
        self.inner.nodes.lock().unwrap().insert(PathBuf::from(path), Node::Dir);
        self
    }

    pub fn file(&self, path: &str, data: &str, secs: u64) -> &Self {
        self.inner.nodes.lock().unwrap().insert(
            PathBuf::from(path),
            Node::File { data: data.as_bytes().to_vec(), modified: at(secs) },
        );
        self
    }

    pub fn link(&self, path: &str, target: &str, secs: u64) -> &Self {
        self.inner.nodes.lock().unwrap().insert(
            PathBuf::from(path),
            Node::Link { target: PathBuf::from(target), modified: at(secs) },
        );
        self
    }

    pub fn deny(&self, path: &str) -> &Self {
        self.inner.denied.lock().unwrap().insert(PathBuf::from(path));
        self
    }

    pub fn lock(&self, path: &str) -> &Self {
        self.inner.locked.lock().unwrap().insert(PathBuf::from(path));
        self
    }

    /// Set `flag` as soon as `after` mutations have been performed.
    pub fn cancel_after(&self, after: usize, flag: Arc<AtomicBool>) -> &Self {
        *self.inner.trip.lock().unwrap() = Some((after, flag));
        self
    }

    pub fn get(&self, path: &str) -> Option<Node> {
        self.inner.nodes.lock().unwrap().get(Path::new(path)).cloned()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Every path beneath `root`, relative, `/`-joined, sorted.
    pub fn paths_under(&self, root: &str) -> Vec<String> {
        let root = Path::new(root);
        self.inner
            .nodes
            .lock()
            .unwrap()
            .keys()
            .filter_map(|p| p.strip_prefix(root).ok())
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    /// Mutations performed so far, in order, e.g. `"mkdir /dst/a"`.
    pub fn ops(&self) -> Vec<String> {
        self.inner.ops.lock().unwrap().clone()
    }

    fn record(&self, op: &str, path: &Path) {
        let mut ops = self.inner.ops.lock().unwrap();
        ops.push(format!("{op} {}", path.display()));
        if let Some((after, flag)) = self.inner.trip.lock().unwrap().as_ref() {
            if ops.len() >= *after {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    fn check_write(&self, path: &Path) -> Result<(), FsError> {
        if self.inner.denied.lock().unwrap().contains(path) {
            return Err(FsError::AccessDenied(path.to_path_buf()));
        }
        Ok(())
    }

    fn require_parent_dir(&self, path: &Path) -> Result<(), FsError> {
        let parent = path.parent().unwrap_or(Path::new("/"));
        match self.inner.nodes.lock().unwrap().get(parent) {
            Some(Node::Dir) => Ok(()),
            _ => Err(FsError::NotFound(parent.to_path_buf())),
        }
    }
}

fn kind_of(node: &Node) -> EntryKind {
    match node {
        Node::File { .. } => EntryKind::File,
        Node::Dir => EntryKind::Directory,
        Node::Link { .. } => EntryKind::Symlink,
    }
}

impl FileSystem for MemFs {
    fn list_children(&self, path: &Path) -> Result<Vec<(OsString, EntryKind)>, FsError> {
        if self.inner.locked.lock().unwrap().contains(path) {
            return Err(FsError::AccessDenied(path.to_path_buf()));
        }
        let nodes = self.inner.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::Dir) => {}
            Some(_) => {
                return Err(FsError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::other("not a directory"),
                })
            }
            None => return Err(FsError::NotFound(path.to_path_buf())),
        }
        Ok(nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .filter_map(|(p, node)| p.file_name().map(|n| (n.to_os_string(), kind_of(node))))
            .collect())
    }

    fn stat(&self, path: &Path, follow_links: bool) -> Result<Metadata, FsError> {
        let nodes = self.inner.nodes.lock().unwrap();
        let mut node = nodes.get(path).ok_or_else(|| FsError::NotFound(path.to_path_buf()))?;
        if follow_links {
            if let Node::Link { target, .. } = node {
                node = nodes.get(target).ok_or_else(|| FsError::NotFound(target.clone()))?;
            }
        }
        let (size, modified) = match node {
            Node::File { data, modified } => (data.len() as u64, *modified),
            Node::Dir => (0, SystemTime::UNIX_EPOCH),
            Node::Link { target, modified } => (target.as_os_str().len() as u64, *modified),
        };
        Ok(Metadata { kind: kind_of(node), size, modified, id: None })
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> Result<u64, FsError> {
        self.check_write(dst)?;
        self.require_parent_dir(dst)?;
        let mut nodes = self.inner.nodes.lock().unwrap();
        let copied = match nodes.get(src) {
            Some(node @ Node::File { data, .. }) => (node.clone(), data.len() as u64),
            _ => return Err(FsError::NotFound(src.to_path_buf())),
        };
        nodes.insert(dst.to_path_buf(), copied.0);
        drop(nodes);
        self.record("copy", dst);
        Ok(copied.1)
    }

    fn copy_symlink(&self, src: &Path, dst: &Path) -> Result<(), FsError> {
        self.check_write(dst)?;
        self.require_parent_dir(dst)?;
        let mut nodes = self.inner.nodes.lock().unwrap();
        let link = match nodes.get(src) {
            Some(node @ Node::Link { .. }) => node.clone(),
            _ => return Err(FsError::NotFound(src.to_path_buf())),
        };
        nodes.insert(dst.to_path_buf(), link);
        drop(nodes);
        self.record("link", dst);
        Ok(())
    }

    fn make_directory(&self, path: &Path) -> Result<(), FsError> {
        self.check_write(path)?;
        self.require_parent_dir(path)?;
        let mut nodes = self.inner.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::Dir) => return Ok(()),
            Some(_) => {
                return Err(FsError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::other("file exists"),
                })
            }
            None => {}
        }
        nodes.insert(path.to_path_buf(), Node::Dir);
        drop(nodes);
        self.record("mkdir", path);
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> Result<(), FsError> {
        self.check_write(path)?;
        let mut nodes = self.inner.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::Dir) => {
                return Err(FsError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::other("is a directory"),
                })
            }
            Some(_) => {}
            None => return Err(FsError::NotFound(path.to_path_buf())),
        }
        nodes.remove(path);
        drop(nodes);
        self.record("rm", path);
        Ok(())
    }

    fn delete_directory(&self, path: &Path) -> Result<(), FsError> {
        self.check_write(path)?;
        let mut nodes = self.inner.nodes.lock().unwrap();
        if !matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        if nodes.keys().any(|p| p.parent() == Some(path)) {
            return Err(FsError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other("directory not empty"),
            });
        }
        nodes.remove(path);
        drop(nodes);
        self.record("rmdir", path);
        Ok(())
    }
}
