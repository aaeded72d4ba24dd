use std::fmt;

use crate::entry::{Entry, EntryKind};
use crate::error::WalkError;
use crate::key::{PathKey, RelPath};

/// One planned change to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Action {
    /// In the source, absent from the destination. `entry.path` is where it
    /// is read from, `target` where it is written: existing destination
    /// directories keep their spelling, new names take the source's.
    Create { entry: Entry, target: RelPath },

    /// In both trees and considered changed. `existing` is the destination's
    /// kind; when it differs from `entry.kind` the destination object is
    /// removed before the source one is written.
    Update {
        entry:    Entry,
        target:   RelPath,
        existing: EntryKind,
    },

    /// In the destination only.
    Delete { path: RelPath, kind: EntryKind },

    /// In both trees and unchanged, or shielded by an unreadable source directory.
    Skip(RelPath),

    /// Two or more source paths fold to one key. Nothing at or beneath
    /// `key` is touched; `shadowed` lists the other paths (from either tree)
    /// that the collision swallows.
    Collision {
        key:      PathKey,
        paths:    Vec<RelPath>,
        shadowed: Vec<RelPath>,
    },
}

impl Action {
    /// The destination path this action concerns, or `None` for a collision.
    pub fn path(&self) -> Option<&RelPath> {
        match self {
            Self::Create { target, .. } | Self::Update { target, .. } => Some(target),
            Self::Delete { path, .. } | Self::Skip(path) => Some(path),
            Self::Collision { .. } => None,
        }
    }

    pub fn key(&self) -> PathKey {
        match self {
            Self::Collision { key, .. } => key.clone(),
            other => other.path().map(RelPath::key).unwrap_or_default(),
        }
    }

    /// The source entry a create or update copies from.
    pub fn entry(&self) -> Option<&Entry> {
        match self {
            Self::Create { entry, .. } | Self::Update { entry, .. } => Some(entry),
            _ => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }

    /// `true` when this update swaps a destination directory for something else.
    pub fn replaces_directory(&self) -> bool {
        matches!(self, Self::Update { entry, existing, .. } if existing.is_dir() && !entry.kind.is_dir())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { target, .. } => write!(f, "create {}", target),
            Self::Update { entry, target, existing } if *existing != entry.kind => {
                write!(f, "replace {} ({:?} -> {:?})", target, existing, entry.kind)
            }
            Self::Update { target, .. } => write!(f, "update {}", target),
            Self::Delete { path, .. } => write!(f, "delete {}", path),
            Self::Skip(path) => write!(f, "skip   {}", path),
            Self::Collision { key, paths, .. } => {
                let names: Vec<String> = paths.iter().map(ToString::to_string).collect();
                write!(f, "collision {} [{}]", key, names.join(", "))
            }
        }
    }
}

/// A path the walker could not read, with the reason.
#[derive(Debug)]
pub struct WalkFailure {
    pub path:   RelPath,
    pub error:  WalkError,
    /// `true` for the source tree, `false` for the destination.
    pub source: bool,
}

/// The ordered, immutable result of a diff.
///
/// Order guarantees:
/// - creates and updates follow the create of every ancestor directory;
/// - a directory's delete follows the deletes of everything beneath it;
/// - deletes clearing a directory that an update replaces come right before
///   that update.
#[derive(Debug, Default)]
pub struct ActionPlan {
    pub(crate) actions:  Vec<Action>,
    pub(crate) failures: Vec<WalkFailure>,
}

impl ActionPlan {
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Walk failures recorded while building the plan.
    pub fn walk_failures(&self) -> &[WalkFailure] {
        &self.failures
    }

    pub fn collisions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| matches!(a, Action::Collision { .. }))
    }

    /// `true` when executing the plan would change nothing.
    pub fn is_noop(&self) -> bool {
        self.actions.iter().all(Action::is_skip)
    }

    pub fn summary(&self) -> ActionSummary {
        let mut summary = ActionSummary::default();
        for action in &self.actions {
            summary.record(action);
        }
        summary
    }

    pub fn into_actions(self) -> Vec<Action> {
        self.actions
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ActionPlan {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.actions)
    }
}

impl<'a> IntoIterator for &'a ActionPlan {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

impl fmt::Display for ActionPlan {
    /// One line per action that changes something; skips are left out.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for action in self.actions.iter().filter(|a| !a.is_skip()) {
            writeln!(f, "{action}")?;
        }
        for failure in &self.failures {
            let side = if failure.source { "source" } else { "destination" };
            writeln!(f, "unreadable ({side}) {}: {}", failure.path, failure.error)?;
        }
        Ok(())
    }
}

/// Action counts by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ActionSummary {
    pub created:    usize,
    pub updated:    usize,
    pub deleted:    usize,
    pub skipped:    usize,
    pub collisions: usize,
    /// Bytes of file content that creates and updates carry.
    pub bytes:      u64,
}

impl ActionSummary {
    pub(crate) fn record(&mut self, action: &Action) {
        match action {
            Action::Create { entry, .. } => {
                self.created += 1;
                self.bytes += entry.size;
            }
            Action::Update { entry, .. } => {
                self.updated += 1;
                self.bytes += entry.size;
            }
            Action::Delete { .. } => self.deleted += 1,
            Action::Skip(_) => self.skipped += 1,
            Action::Collision { .. } => self.collisions += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted + self.skipped + self.collisions
    }
}
