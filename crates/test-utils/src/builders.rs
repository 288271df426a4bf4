#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use taskloom::task::{
    CallbackAction, CommandLines, CommandSpec, FnOutcome, TaskAction, TaskDefinition, TaskHandler,
    TaskResult,
};

/// Builder for `TaskDefinition` to simplify test setup.
pub struct TaskBuilder {
    def: TaskDefinition,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            def: TaskDefinition::new(id),
        }
    }

    /// Task running a single shell command line.
    pub fn cmd(mut self, line: &str) -> Self {
        self.def.action = Some(TaskAction::Command(CommandSpec::Line(line.to_string())));
        self
    }

    /// Task running an ordered command sequence.
    pub fn cmds(mut self, lines: &[&str]) -> Self {
        self.def.action = Some(TaskAction::Command(CommandSpec::Sequence(
            lines.iter().map(|s| s.to_string()).collect(),
        )));
        self
    }

    /// Task whose command lines are produced at execution time.
    pub fn lazy_cmd<F>(mut self, produce: F) -> Self
    where
        F: Fn() -> CommandLines + Send + Sync + 'static,
    {
        self.def.action = Some(TaskAction::Command(CommandSpec::Lazy(Arc::new(produce))));
        self
    }

    /// Task driven by a custom handler.
    pub fn handler<H>(mut self, handler: H) -> Self
    where
        H: TaskHandler + 'static,
    {
        self.def.action = Some(TaskAction::Handler(Arc::new(handler)));
        self
    }

    /// Task running an in-process function.
    pub fn function<F>(mut self, body: F) -> Self
    where
        F: Fn() -> FnOutcome + Send + Sync + 'static,
    {
        self.def.action = Some(TaskAction::Function(Arc::new(body)));
        self
    }

    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.def.when = Some(Arc::new(predicate));
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.def.depends_on.push(dep.to_string());
        self
    }

    pub fn on_success_task(mut self, id: &str) -> Self {
        self.def.on_success.push(CallbackAction::task(id));
        self
    }

    pub fn on_fail_task(mut self, id: &str) -> Self {
        self.def.on_fail.push(CallbackAction::task(id));
        self
    }

    pub fn on_success_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskResult) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.def.on_success.push(CallbackAction::func(f));
        self
    }

    pub fn on_fail_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskResult) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.def.on_fail.push(CallbackAction::func(f));
        self
    }

    pub fn on_success(mut self, action: CallbackAction) -> Self {
        self.def.on_success.push(action);
        self
    }

    pub fn on_fail(mut self, action: CallbackAction) -> Self {
        self.def.on_fail.push(action);
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.def.label = Some(label.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.def.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.def.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> TaskDefinition {
        self.def
    }
}
