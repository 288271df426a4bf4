// src/config/model.rs

//! Config data model for the TOML task file.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::task::{CallbackAction, CommandSpec, TaskAction, TaskDefinition};

/// One `[task.<name>]` or `[template.<name>]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskEntry {
    /// Single shell command line. Mutually exclusive with `cmds`.
    pub cmd: Option<String>,
    /// Ordered command sequence; stops at the first nonzero exit.
    pub cmds: Option<Vec<String>>,
    pub label: Option<String>,
    pub icon: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Task or template ids run when this task succeeds.
    #[serde(default)]
    pub on_success: Vec<String>,
    /// Task or template ids run when this task fails.
    #[serde(default)]
    pub on_fail: Vec<String>,
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
}

impl TaskEntry {
    /// Convert into a concrete task definition bound to `id`.
    pub fn into_definition(self, id: &str) -> TaskDefinition {
        let action = match (self.cmd, self.cmds) {
            (Some(line), _) => Some(TaskAction::Command(CommandSpec::Line(line))),
            (None, Some(lines)) => Some(TaskAction::Command(CommandSpec::Sequence(lines))),
            (None, None) => None,
        };

        TaskDefinition {
            id: id.to_string(),
            label: self.label,
            icon: self.icon,
            action,
            when: None,
            depends_on: self.depends_on,
            on_success: self.on_success.into_iter().map(CallbackAction::Task).collect(),
            on_fail: self.on_fail.into_iter().map(CallbackAction::Task).collect(),
            cwd: self.cwd.map(PathBuf::from),
            env: self.env.into_iter().collect(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Raw deserialized task file, before semantic validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub task: BTreeMap<String, TaskEntry>,
    #[serde(default)]
    pub template: BTreeMap<String, TaskEntry>,
}

/// Validated task file.
///
/// Constructed only through `TryFrom<RawConfigFile>` (see
/// [`crate::config::validate`]), so holding one implies the dependency
/// graph is acyclic and all `depends_on` references resolve.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    task: BTreeMap<String, TaskEntry>,
    template: BTreeMap<String, TaskEntry>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        task: BTreeMap<String, TaskEntry>,
        template: BTreeMap<String, TaskEntry>,
    ) -> Self {
        Self { task, template }
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskEntry> {
        &self.task
    }

    pub fn templates(&self) -> &BTreeMap<String, TaskEntry> {
        &self.template
    }

    /// Concrete definitions for the batch, in file order.
    pub fn task_definitions(&self) -> Vec<TaskDefinition> {
        self.task
            .iter()
            .map(|(id, entry)| entry.clone().into_definition(id))
            .collect()
    }

    /// Concrete definitions for the registered templates.
    pub fn template_definitions(&self) -> Vec<TaskDefinition> {
        self.template
            .iter()
            .map(|(id, entry)| entry.clone().into_definition(id))
            .collect()
    }
}
