use std::fmt;
use std::path::{Path, PathBuf};

/// A path relative to a tree root, one segment per component, original case preserved.
///
/// Segments never contain a path separator. The empty path is the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelPath(Vec<String>);

impl RelPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// A child of this path named `name`.
    pub fn join(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// The containing path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        match self.0.split_last() {
            Some((_, rest)) => Some(Self(rest.to_vec())),
            None => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve this path beneath `base`.
    pub fn to_path(&self, base: &Path) -> PathBuf {
        let mut path = base.to_path_buf();
        path.extend(&self.0);
        path
    }

    pub fn key(&self) -> PathKey {
        PathKey::from(self)
    }
}

impl From<&str> for RelPath {
    /// Parse a `/`-separated path; empty components are dropped.
    fn from(s: &str) -> Self {
        Self::from_segments(s.split('/').filter(|part| !part.is_empty()))
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str(".");
        }
        f.write_str(&self.0.join("/"))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for RelPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Case-folded identity of a [`RelPath`], used only to match entries across trees.
///
/// Folding is the same on both trees no matter what the hosting filesystems
/// actually do, so two names a case-insensitive destination would store in one
/// slot always share a key. Ordering is segment-wise, which keeps every subtree
/// contiguous and places a directory before all of its descendants.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathKey(Vec<String>);

impl PathKey {
    pub fn parent(&self) -> Option<Self> {
        match self.0.split_last() {
            Some((_, rest)) => Some(Self(rest.to_vec())),
            None => None,
        }
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Strict ancestors, nearest first, excluding the root.
    pub fn ancestors(&self) -> impl Iterator<Item = PathKey> + '_ {
        (1..self.0.len()).rev().map(|n| Self(self.0[..n].to_vec()))
    }

    /// `true` if `other` lies strictly beneath this key.
    pub fn is_ancestor_of(&self, other: &PathKey) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    /// `true` if `other` is this key or lies beneath it.
    pub fn contains(&self, other: &PathKey) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl From<&RelPath> for PathKey {
    fn from(path: &RelPath) -> Self {
        Self(path.segments().iter().map(|s| s.to_lowercase()).collect())
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PathKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
