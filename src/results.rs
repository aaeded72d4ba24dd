use std::time::Duration;

use crate::error::ExecutionError;
use crate::key::RelPath;
use crate::plan::{ActionPlan, ActionSummary, WalkFailure};

/// One action that did not complete.
#[derive(Debug)]
pub struct Failure {
    /// Destination path the action concerned.
    pub path: RelPath,

    pub error: ExecutionError,
}

/// The output of a completed (or dry) run.
///
/// `planned` counts what the plan asked for, `applied` what actually
/// happened. For a dry run `applied` is all zeros.
#[derive(Debug)]
pub struct SyncResult {
    /// `true` when nothing was executed.
    pub dry_run: bool,

    /// The plan that was executed (or would have been).
    pub plan: ActionPlan,

    /// Action counts straight from the plan.
    pub planned: ActionSummary,

    /// Actions that completed. Skips count as applied.
    pub applied: ActionSummary,

    /// Per-action failures, ordered by path.
    pub failures: Vec<Failure>,

    /// Extraneous destination entries left in place because deletion was disabled.
    pub retained: usize,

    /// Special files (devices, pipes, sockets) that could not be reproduced.
    pub unsupported: usize,

    /// Actions skipped because the run was cancelled.
    pub not_run: usize,

    /// The cancellation flag was observed.
    pub cancelled: bool,

    /// Bytes of file content written to the destination.
    pub bytes_copied: u64,

    /// Wall-clock time spent executing (excluding the diff).
    pub duration: Duration,
}

impl SyncResult {
    pub(crate) fn dry_run(plan: ActionPlan, duration: Duration) -> Self {
        Self {
            dry_run:      true,
            planned:      plan.summary(),
            applied:      ActionSummary::default(),
            failures:     Vec::new(),
            retained:     0,
            unsupported:  0,
            not_run:      0,
            cancelled:    false,
            bytes_copied: 0,
            duration,
            plan,
        }
    }

    /// `true` when no action failed and no collision blocked a path.
    ///
    /// This is what a command-line front end should base its exit status on.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.planned.collisions == 0
    }

    /// [`is_success`](Self::is_success), and additionally nothing was left
    /// unread by the walks and the run was not cancelled.
    pub fn is_complete(&self) -> bool {
        self.is_success() && self.plan.walk_failures().is_empty() && !self.cancelled
    }

    pub fn walk_failures(&self) -> &[WalkFailure] {
        self.plan.walk_failures()
    }
}
