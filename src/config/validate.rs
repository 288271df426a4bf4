// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TaskloomError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskloomError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.task, raw.template))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_entries(cfg)?;
    validate_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TaskloomError::Config(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_entries(cfg: &RawConfigFile) -> Result<()> {
    let entries = cfg
        .task
        .iter()
        .map(|(name, entry)| ("task", name, entry))
        .chain(
            cfg.template
                .iter()
                .map(|(name, entry)| ("template", name, entry)),
        );

    for (kind, name, entry) in entries {
        if name.trim().is_empty() {
            return Err(TaskloomError::Config(format!(
                "[{kind}] section with an empty name"
            )));
        }
        if entry.cmd.is_some() && entry.cmds.is_some() {
            return Err(TaskloomError::Config(format!(
                "{kind} '{name}' sets both `cmd` and `cmds`; use one"
            )));
        }
    }
    Ok(())
}

fn validate_dependencies(cfg: &RawConfigFile) -> Result<()> {
    // Callback ids are deliberately not checked here: an unresolvable
    // callback target is a runtime warning, not a config error.
    for (name, entry) in cfg.task.iter() {
        for dep in entry.depends_on.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(TaskloomError::Config(format!(
                    "task '{name}' has unknown dependency '{dep}' in `depends_on`"
                )));
            }
            if dep == name {
                return Err(TaskloomError::Config(format!(
                    "task '{name}' cannot depend on itself"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task. A dependency cycle would stall the
    // batch forever, so it is rejected up front.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, entry) in cfg.task.iter() {
        for dep in entry.depends_on.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(TaskloomError::DependencyCycle(format!(
                "cycle in `depends_on` involving task '{node}'"
            )))
        }
    }
}
