// src/task.rs

//! Task definitions and the result/verdict types exchanged between the
//! executor, the callback system, and user-supplied handlers.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::state::SharedRegistry;

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// Gate predicate evaluated once before a seeded task becomes eligible.
pub type WhenFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// In-process function body of a task.
pub type TaskFn = Arc<dyn Fn() -> FnOutcome + Send + Sync>;

/// Callback function invoked with the triggering task's result.
pub type CallbackFn = Arc<dyn Fn(&TaskResult) -> anyhow::Result<()> + Send + Sync>;

/// Lazy command producer, evaluated at execution time.
pub type CommandFn = Arc<dyn Fn() -> CommandLines + Send + Sync>;

/// Immutable description of one schedulable unit of work.
///
/// Supplied by the caller (or converted from the TOML task file); the
/// orchestrator never mutates a definition. Mutable per-run state lives in
/// the [`crate::state::TaskRegistry`].
#[derive(Clone)]
pub struct TaskDefinition {
    /// Unique, non-empty key.
    pub id: TaskId,
    /// Display label (passed through to snapshots, not interpreted).
    pub label: Option<String>,
    /// Display icon (passed through to snapshots, not interpreted).
    pub icon: Option<String>,
    /// What to run. `None` means "nothing to run": the task resolves to a
    /// vacuous success and its `on_success` chain still fires.
    pub action: Option<TaskAction>,
    /// Optional gate; if present and false at seed time the task is forced
    /// to `Skipped` before it ever becomes eligible to run.
    pub when: Option<WhenFn>,
    /// Task ids that must reach Success or Skipped before this task starts.
    pub depends_on: Vec<TaskId>,
    /// Reactions dispatched when the task ends in Success.
    pub on_success: Vec<CallbackAction>,
    /// Reactions dispatched when the task ends in Failed.
    pub on_fail: Vec<CallbackAction>,
    /// Working directory for command execution.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for command execution.
    pub env: Vec<(String, String)>,
    /// Per-task deadline; on expiry the task is aborted via the same kill
    /// path used for global cancellation.
    pub timeout: Option<Duration>,
}

impl TaskDefinition {
    /// A definition with the given id and nothing to run.
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            label: None,
            icon: None,
            action: None,
            when: None,
            depends_on: Vec::new(),
            on_success: Vec::new(),
            on_fail: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// A definition running a single shell command line.
    pub fn command(id: impl Into<TaskId>, line: impl Into<String>) -> Self {
        let mut def = Self::new(id);
        def.action = Some(TaskAction::Command(CommandSpec::Line(line.into())));
        def
    }

    /// A definition running an ordered sequence of shell command lines.
    pub fn command_sequence(
        id: impl Into<TaskId>,
        lines: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut def = Self::new(id);
        def.action = Some(TaskAction::Command(CommandSpec::Sequence(
            lines.into_iter().map(Into::into).collect(),
        )));
        def
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

/// The execution method of a task.
///
/// Exactly one method per task; the enum replaces the original design's
/// "probe handler, then function, then command" priority chain with an
/// exhaustive match.
#[derive(Clone)]
pub enum TaskAction {
    /// Shell command(s), executed via the process manager.
    Command(CommandSpec),
    /// Zero-argument in-process function.
    Function(TaskFn),
    /// Custom handler receiving an execution context.
    Handler(Arc<dyn TaskHandler>),
}

impl fmt::Debug for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAction::Command(spec) => f.debug_tuple("Command").field(spec).finish(),
            TaskAction::Function(_) => f.write_str("Function(..)"),
            TaskAction::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// Command payload of a task: fixed or produced lazily at execution time.
#[derive(Clone)]
pub enum CommandSpec {
    Line(String),
    Sequence(Vec<String>),
    Lazy(CommandFn),
}

impl CommandSpec {
    /// Resolve to concrete command lines, calling the producer if lazy.
    ///
    /// Blank lines and empty sequences collapse to [`CommandLines::Empty`],
    /// which the executor treats as a vacuous success.
    pub fn resolve(&self) -> CommandLines {
        match self {
            CommandSpec::Line(line) if line.trim().is_empty() => CommandLines::Empty,
            CommandSpec::Line(line) => CommandLines::Line(line.clone()),
            CommandSpec::Sequence(lines) if lines.is_empty() => CommandLines::Empty,
            CommandSpec::Sequence(lines) => CommandLines::Sequence(lines.clone()),
            CommandSpec::Lazy(produce) => produce(),
        }
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::Line(line) => f.debug_tuple("Line").field(line).finish(),
            CommandSpec::Sequence(lines) => f.debug_tuple("Sequence").field(lines).finish(),
            CommandSpec::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

/// Concrete command lines after lazy resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLines {
    Empty,
    Line(String),
    Sequence(Vec<String>),
}

/// Outcome of an in-process function task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FnOutcome {
    Pass,
    Fail,
    /// Explicit ok/message pair; the message is carried into the task result.
    Report { ok: bool, message: String },
}

/// Verdict returned by a custom [`TaskHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerVerdict {
    /// Terminal success; callbacks dispatch immediately.
    Success,
    /// Terminal failure; callbacks dispatch immediately.
    Failed,
    /// Run this command line under the same task id.
    RunCommand(String),
    /// The handler assumes full responsibility for eventually setting a
    /// terminal state through the registry; the executor does nothing more.
    Detached,
}

/// Execution context handed to a custom handler.
pub struct TaskContext<'a> {
    /// The definition being executed.
    pub task: &'a TaskDefinition,
    /// Registry access, usable after [`HandlerVerdict::Detached`] to set the
    /// eventual terminal state.
    pub registry: SharedRegistry,
}

/// Custom execution strategy for a task.
pub trait TaskHandler: Send + Sync {
    fn run(&self, ctx: TaskContext<'_>) -> HandlerVerdict;
}

/// One element of an `on_success` / `on_fail` reaction chain.
#[derive(Clone)]
pub enum CallbackAction {
    /// Run the task (or materialize the template) with this id.
    Task(TaskId),
    /// Invoke a function with the triggering task's result.
    Func(CallbackFn),
}

impl CallbackAction {
    pub fn task(id: impl Into<TaskId>) -> Self {
        CallbackAction::Task(id.into())
    }

    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&TaskResult) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        CallbackAction::Func(Arc::new(f))
    }
}

impl fmt::Debug for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::Task(id) => f.debug_tuple("Task").field(id).finish(),
            CallbackAction::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Result payload of a finished task, handed to callbacks.
#[derive(Debug, Clone, Default)]
pub struct TaskResult {
    pub success: bool,
    /// Exit code of the (last) process, when one ran.
    pub exit_code: Option<i32>,
    /// Message from a structured function outcome, when present.
    pub message: Option<String>,
    /// Combined stdout+stderr in arrival order.
    pub output: String,
    pub stdout: String,
    pub stderr: String,
}

impl TaskResult {
    pub fn passed() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
