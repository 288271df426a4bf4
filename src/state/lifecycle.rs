// src/state/lifecycle.rs

//! Task lifecycle states and transition rules.

use std::fmt;

/// Lifecycle state of a task instance within one batch.
///
/// Legal transitions:
/// `Pending -> Waiting | Skipped | Running`, `Waiting -> Running`,
/// `Running -> Success | Failed | Aborted`. Nothing leaves `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskLifecycle {
    /// Seeded and eligible, not yet dispatched.
    Pending,
    /// Has unmet dependencies; promoted by the scheduler poll.
    Waiting,
    /// Dispatched to the executor.
    Running,
    Success,
    Failed,
    /// Gated out by a false `when` predicate. Terminal, non-failure.
    Skipped,
    /// Killed externally. Sticky: no later transition may overwrite it.
    Aborted,
}

impl TaskLifecycle {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskLifecycle::Success
                | TaskLifecycle::Failed
                | TaskLifecycle::Skipped
                | TaskLifecycle::Aborted
        )
    }

    /// Whether a dependency in this state counts as satisfied.
    ///
    /// Only terminal success or terminal skip satisfy; Failed and Aborted
    /// permanently withhold dependents.
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, TaskLifecycle::Success | TaskLifecycle::Skipped)
    }

    /// Whether a dependency in this state can never satisfy anymore.
    pub fn blocks_dependency(self) -> bool {
        matches!(self, TaskLifecycle::Failed | TaskLifecycle::Aborted)
    }
}

impl fmt::Display for TaskLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TaskLifecycle::Pending => "pending",
            TaskLifecycle::Waiting => "waiting",
            TaskLifecycle::Running => "running",
            TaskLifecycle::Success => "success",
            TaskLifecycle::Failed => "failed",
            TaskLifecycle::Skipped => "skipped",
            TaskLifecycle::Aborted => "aborted",
        };
        f.write_str(text)
    }
}
