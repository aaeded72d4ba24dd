use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::SyncError;
use crate::key::RelPath;

/// Gitignore-style exclude patterns, matched against paths relative to each root.
///
/// The same set is applied to both walks, so an excluded path is neither
/// copied from the source nor deleted from the destination. Patterns are
/// matched case-insensitively to agree with [`PathKey`](crate::PathKey).
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    matcher: Option<Gitignore>,
}

impl Exclusions {
    /// An empty set that excludes nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new<I, S>(patterns: I) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GitignoreBuilder::new("");
        builder.case_insensitive(true).map_err(|e| SyncError::InvalidPattern(e.to_string()))?;

        let mut any = false;
        for pattern in patterns {
            builder
                .add_line(None, pattern.as_ref())
                .map_err(|e| SyncError::InvalidPattern(e.to_string()))?;
            any = true;
        }
        if !any {
            return Ok(Self::none());
        }

        let matcher = builder
            .build()
            .map_err(|e| SyncError::InvalidPattern(e.to_string()))?;
        Ok(Self { matcher: Some(matcher) })
    }

    pub fn is_excluded(&self, path: &RelPath, is_dir: bool) -> bool {
        match &self.matcher {
            Some(m) => m.matched(path.to_path(Path::new("")), is_dir).is_ignore(),
            None => false,
        }
    }
}
