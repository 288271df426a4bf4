// src/state/registry.rs

//! Mutable per-batch task state, owned exclusively by the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::state::lifecycle::TaskLifecycle;
use crate::task::{TaskDefinition, TaskId};

/// Mutable state of one task instance within the current batch.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub state: TaskLifecycle,
    /// Append-only captured text, stdout+stderr interleaved in arrival order.
    pub output: String,
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
    /// Dependency list snapshot taken at initialization.
    pub depends_on: Vec<TaskId>,
    /// Whether this instance was triggered as a reaction to another task.
    pub is_callback: bool,
    /// The triggering task, when `is_callback`. Display lineage only; the
    /// scheduler never consults it.
    pub parent_task: Option<TaskId>,
    pub label: Option<String>,
    pub icon: Option<String>,
    /// Set once an execution of this record has been claimed, so a task is
    /// dispatched at most once per batch.
    launched: bool,
}

impl TaskRecord {
    fn from_definition(def: &TaskDefinition) -> Self {
        Self {
            state: TaskLifecycle::Pending,
            output: String::new(),
            start_time: None,
            end_time: None,
            depends_on: def.depends_on.clone(),
            is_callback: false,
            parent_task: None,
            label: def.label.clone(),
            icon: def.icon.clone(),
            launched: false,
        }
    }
}

/// Point-in-time view of one task, sufficient for a UI layer to render
/// status, icon, indentation depth (via `parent_task`), and elapsed time.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub state: TaskLifecycle,
    pub output: String,
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
    pub depends_on: Vec<TaskId>,
    pub is_callback: bool,
    pub parent_task: Option<TaskId>,
    pub label: Option<String>,
    pub icon: Option<String>,
}

impl TaskSnapshot {
    /// Wall time the task has been (or was) running.
    pub fn elapsed(&self) -> Option<Duration> {
        let start = self.start_time?;
        Some(self.end_time.unwrap_or_else(Instant::now) - start)
    }
}

/// Owns the state of every task instance in the current batch.
///
/// One record per task id; records are destroyed only by [`clear`] at the
/// start of a new batch, never individually.
///
/// [`clear`]: TaskRegistry::clear
#[derive(Debug, Default)]
pub struct TaskRegistry {
    records: HashMap<TaskId, TaskRecord>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all records (start of a new batch).
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Create a record at Pending, or refresh an existing one.
    ///
    /// If the id already exists, its state and callback lineage are
    /// preserved and only the dependency snapshot is refreshed. A Waiting
    /// or Running task re-referenced as a callback target keeps its state;
    /// resetting it to Pending would make it claimable past its unmet
    /// dependencies.
    pub fn initialize(&mut self, def: &TaskDefinition) {
        match self.records.get_mut(&def.id) {
            Some(record) => {
                record.depends_on = def.depends_on.clone();
            }
            None => {
                self.records
                    .insert(def.id.clone(), TaskRecord::from_definition(def));
            }
        }
    }

    /// Tag a record as a callback of `parent`, idempotently.
    ///
    /// The first parent wins; re-marking from a second trigger keeps the
    /// original lineage.
    pub fn mark_callback(&mut self, id: &str, parent: &str) {
        match self.records.get_mut(id) {
            Some(record) => {
                if !record.is_callback {
                    record.is_callback = true;
                    record.parent_task = Some(parent.to_string());
                }
            }
            None => warn!(task = %id, "mark_callback on unknown task; ignoring"),
        }
    }

    /// Claim the single allowed execution of a task.
    ///
    /// Returns true exactly once per record, and only while the record is
    /// still Pending: a Waiting record has unmet dependencies and may only
    /// be launched through [`take_ready_waiting`], which claims after
    /// checking them. The seed and callback dispatch paths claim before
    /// spawning, so a task referenced from several places runs at most
    /// once.
    ///
    /// [`take_ready_waiting`]: TaskRegistry::take_ready_waiting
    pub fn claim_for_launch(&mut self, id: &str) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                let claimable = record.state == TaskLifecycle::Pending && !record.launched;
                if claimable {
                    record.launched = true;
                }
                claimable
            }
            None => {
                warn!(task = %id, "claim_for_launch on unknown task; ignoring");
                false
            }
        }
    }

    /// Transition to Running and stamp the start time.
    pub fn set_running(&mut self, id: &str) {
        match self.records.get_mut(id) {
            Some(record) => match record.state {
                TaskLifecycle::Pending | TaskLifecycle::Waiting => {
                    record.state = TaskLifecycle::Running;
                    record.start_time = Some(Instant::now());
                }
                other => {
                    debug!(task = %id, state = %other, "set_running ignored in current state");
                }
            },
            None => warn!(task = %id, "set_running on unknown task; ignoring"),
        }
    }

    /// Mark a Pending task as Waiting on its dependencies.
    pub fn set_waiting(&mut self, id: &str) {
        if let Some(record) = self.records.get_mut(id) {
            if record.state == TaskLifecycle::Pending {
                record.state = TaskLifecycle::Waiting;
            }
        }
    }

    /// Gate a Pending task out of the batch (`when` returned false).
    pub fn set_skipped(&mut self, id: &str) {
        if let Some(record) = self.records.get_mut(id) {
            if record.state == TaskLifecycle::Pending {
                record.state = TaskLifecycle::Skipped;
                record.end_time = Some(Instant::now());
            }
        }
    }

    /// Transition guarded by the Aborted-is-sticky invariant.
    ///
    /// Returns whether the transition was applied. All terminal writes from
    /// the executor go through this guard, so a race between "kill all" and
    /// "process just finished" cannot resurrect a killed task.
    pub fn safe_set_state(&mut self, id: &str, state: TaskLifecycle) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                if record.state == TaskLifecycle::Aborted {
                    debug!(task = %id, requested = %state, "state write refused; task is aborted");
                    return false;
                }
                record.state = state;
                if state.is_terminal() {
                    record.end_time = Some(Instant::now());
                }
                true
            }
            None => {
                warn!(task = %id, "safe_set_state on unknown task; ignoring");
                false
            }
        }
    }

    /// Force a task to Aborted and append a note to its output.
    ///
    /// Output may still be appended to an aborted task; the state itself is
    /// final.
    pub fn set_aborted(&mut self, id: &str, note: &str) {
        match self.records.get_mut(id) {
            Some(record) => {
                if record.state != TaskLifecycle::Aborted {
                    record.state = TaskLifecycle::Aborted;
                    record.end_time = Some(Instant::now());
                }
                record.output.push_str(note);
                record.output.push('\n');
            }
            None => warn!(task = %id, "set_aborted on unknown task; ignoring"),
        }
    }

    /// Append captured text to a task's output.
    pub fn append_output(&mut self, id: &str, chunk: &str) {
        if let Some(record) = self.records.get_mut(id) {
            record.output.push_str(chunk);
        }
    }

    /// True iff no task is Pending, Waiting, or Running.
    pub fn all_terminal(&self) -> bool {
        self.records.values().all(|r| r.state.is_terminal())
    }

    pub fn state_of(&self, id: &str) -> Option<TaskLifecycle> {
        self.records.get(id).map(|r| r.state)
    }

    pub fn record(&self, id: &str) -> Option<&TaskRecord> {
        self.records.get(id)
    }

    /// Waiting tasks whose dependencies are all Success or Skipped.
    ///
    /// A dependency missing from the registry counts as unsatisfied.
    pub fn ready_waiting(&self) -> Vec<TaskId> {
        self.records
            .iter()
            .filter(|(_, record)| {
                record.state == TaskLifecycle::Waiting
                    && !record.launched
                    && record.depends_on.iter().all(|dep| {
                        self.records
                            .get(dep)
                            .is_some_and(|d| d.state.satisfies_dependency())
                    })
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Like [`ready_waiting`], but claims each returned task for launch.
    ///
    /// [`ready_waiting`]: TaskRegistry::ready_waiting
    pub fn take_ready_waiting(&mut self) -> Vec<TaskId> {
        let ready = self.ready_waiting();
        for id in &ready {
            if let Some(record) = self.records.get_mut(id) {
                record.launched = true;
            }
        }
        ready
    }

    /// Waiting tasks that can never be promoted anymore: nothing is Pending
    /// or Running and no Waiting task is ready.
    ///
    /// The stuck tasks deliberately stay Waiting (the state machine never
    /// invents a terminal state for them); the scheduler reports them and
    /// stops polling.
    pub fn stalled_waiting(&self) -> Vec<TaskId> {
        let in_flight = self.records.values().any(|r| {
            matches!(r.state, TaskLifecycle::Running)
                || (matches!(r.state, TaskLifecycle::Pending | TaskLifecycle::Waiting)
                    && r.launched)
        });
        if in_flight || !self.ready_waiting().is_empty() {
            return Vec::new();
        }

        let mut stuck: Vec<TaskId> = self
            .records
            .iter()
            .filter(|(_, r)| r.state == TaskLifecycle::Waiting)
            .map(|(id, _)| id.clone())
            .collect();
        stuck.sort();
        stuck
    }

    /// Point-in-time snapshot of every task, sorted by id for determinism.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        let mut snaps: Vec<TaskSnapshot> = self
            .records
            .iter()
            .map(|(id, record)| TaskSnapshot {
                id: id.clone(),
                state: record.state,
                output: record.output.clone(),
                start_time: record.start_time,
                end_time: record.end_time,
                depends_on: record.depends_on.clone(),
                is_callback: record.is_callback,
                parent_task: record.parent_task.clone(),
                label: record.label.clone(),
                icon: record.icon.clone(),
            })
            .collect();
        snaps.sort_by(|a, b| a.id.cmp(&b.id));
        snaps
    }
}

/// Cloneable handle to the registry, shared between the run driver, the
/// executor, the callback system, the scheduler, and detached handlers.
///
/// The original design ran on a single-threaded event loop; on a
/// multi-threaded Tokio runtime the mutex provides the equivalent "one
/// mutation at a time" guarantee. The lock is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<Mutex<TaskRegistry>>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut TaskRegistry) -> T) -> T {
        let mut guard = self.inner.lock().expect("task registry mutex poisoned");
        f(&mut guard)
    }

    pub fn clear(&self) {
        self.with(|r| r.clear());
    }

    pub fn initialize(&self, def: &TaskDefinition) {
        self.with(|r| r.initialize(def));
    }

    pub fn mark_callback(&self, id: &str, parent: &str) {
        self.with(|r| r.mark_callback(id, parent));
    }

    /// Atomically ensure a record exists for a callback target, tag its
    /// lineage, and claim the launch if it is still eligible.
    ///
    /// Returns whether the caller should actually launch the task.
    pub fn adopt_callback(&self, def: &TaskDefinition, parent: &str) -> bool {
        self.with(|r| {
            r.initialize(def);
            r.mark_callback(&def.id, parent);
            r.claim_for_launch(&def.id)
        })
    }

    pub fn claim_for_launch(&self, id: &str) -> bool {
        self.with(|r| r.claim_for_launch(id))
    }

    pub fn set_running(&self, id: &str) {
        self.with(|r| r.set_running(id));
    }

    pub fn set_waiting(&self, id: &str) {
        self.with(|r| r.set_waiting(id));
    }

    pub fn set_skipped(&self, id: &str) {
        self.with(|r| r.set_skipped(id));
    }

    pub fn safe_set_state(&self, id: &str, state: TaskLifecycle) -> bool {
        self.with(|r| r.safe_set_state(id, state))
    }

    pub fn set_aborted(&self, id: &str, note: &str) {
        self.with(|r| r.set_aborted(id, note));
    }

    pub fn append_output(&self, id: &str, chunk: &str) {
        self.with(|r| r.append_output(id, chunk));
    }

    pub fn all_terminal(&self) -> bool {
        self.with(|r| r.all_terminal())
    }

    pub fn state_of(&self, id: &str) -> Option<TaskLifecycle> {
        self.with(|r| r.state_of(id))
    }

    pub fn take_ready_waiting(&self) -> Vec<TaskId> {
        self.with(|r| r.take_ready_waiting())
    }

    pub fn stalled_waiting(&self) -> Vec<TaskId> {
        self.with(|r| r.stalled_waiting())
    }

    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.with(|r| r.snapshot())
    }
}
