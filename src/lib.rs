// src/lib.rs

pub mod callback;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod orchestrator;
pub mod sched;
pub mod state;
pub mod task;

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, ConfigFile};
use crate::errors::TaskloomError;
use crate::orchestrator::Orchestrator;
use crate::state::{TaskLifecycle, TaskSnapshot};
use crate::task::TaskDefinition;

pub use crate::orchestrator::Orchestrator as TaskOrchestrator;

/// High-level entry point used by `main.rs`.
///
/// Wires together config loading, the orchestrator, Ctrl-C handling, and
/// the final summary. Returns whether the whole batch succeeded.
pub async fn run(args: CliArgs) -> Result<bool> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(true);
    }

    let mut defs = cfg.task_definitions();
    if let Some(root) = &args.task {
        defs = subgraph_of(defs, root)?;
    }

    let orchestrator = Orchestrator::new();
    for template in cfg.template_definitions() {
        orchestrator.register_template(template);
    }

    // Ctrl-C -> kill all in-flight work.
    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            orchestrator.kill_all();
        });
    }

    orchestrator.run_batch(defs)?;

    let stalled = match orchestrator.wait_idle().await {
        Ok(()) => Vec::new(),
        Err(TaskloomError::BatchStalled(stuck)) => stuck,
        Err(other) => return Err(other.into()),
    };

    let snaps = orchestrator.snapshot();
    print_summary(&snaps, &stalled);

    let all_good = stalled.is_empty()
        && snaps
            .iter()
            .all(|s| !matches!(s.state, TaskLifecycle::Failed | TaskLifecycle::Aborted));
    Ok(all_good)
}

/// Restrict the batch to `root` and its transitive dependencies.
fn subgraph_of(defs: Vec<TaskDefinition>, root: &str) -> Result<Vec<TaskDefinition>> {
    let by_id: HashMap<String, TaskDefinition> =
        defs.into_iter().map(|d| (d.id.clone(), d)).collect();

    if !by_id.contains_key(root) {
        return Err(TaskloomError::TaskNotFound(root.to_string()).into());
    }

    let mut keep: BTreeSet<String> = BTreeSet::new();
    let mut stack = vec![root.to_string()];
    while let Some(id) = stack.pop() {
        if !keep.insert(id.clone()) {
            continue;
        }
        if let Some(def) = by_id.get(&id) {
            stack.extend(def.depends_on.iter().cloned());
        } else {
            warn!(task = %id, "dependency not in task file; it can never be satisfied");
        }
    }

    info!(root = %root, tasks = keep.len(), "restricting batch to subgraph");
    Ok(by_id
        .into_values()
        .filter(|d| keep.contains(&d.id))
        .collect())
}

/// Indentation depth of a task, derived by walking `parent_task` pointers.
fn lineage_depth(snap: &TaskSnapshot, by_id: &HashMap<&str, &TaskSnapshot>) -> usize {
    let mut depth = 0;
    let mut current = snap.parent_task.as_deref();
    // Lineage forms a tree; the bound only guards against malformed input.
    while let Some(parent) = current {
        if depth > 32 {
            break;
        }
        depth += 1;
        current = by_id.get(parent).and_then(|p| p.parent_task.as_deref());
    }
    depth
}

fn print_summary(snaps: &[TaskSnapshot], stalled: &[String]) {
    let by_id: HashMap<&str, &TaskSnapshot> =
        snaps.iter().map(|s| (s.id.as_str(), s)).collect();

    println!("taskloom summary");
    for snap in snaps {
        let indent = "  ".repeat(lineage_depth(snap, &by_id) + 1);
        let name = snap.label.as_deref().unwrap_or(&snap.id);
        let elapsed = snap
            .elapsed()
            .map(|d| format!(" ({:.1}s)", d.as_secs_f64()))
            .unwrap_or_default();
        println!("{indent}{name}: {}{elapsed}", snap.state);

        if matches!(snap.state, TaskLifecycle::Failed | TaskLifecycle::Aborted)
            && !snap.output.is_empty()
        {
            for line in snap.output.lines() {
                println!("{indent}  | {line}");
            }
        }
    }

    if !stalled.is_empty() {
        println!(
            "blocked (failed or aborted dependency): {}",
            stalled.join(", ")
        );
    }
}

fn print_dry_run(cfg: &ConfigFile) {
    println!("taskloom dry-run");
    println!("tasks ({}):", cfg.tasks().len());
    for (name, entry) in cfg.tasks().iter() {
        println!("  - {name}");
        if let Some(cmd) = &entry.cmd {
            println!("      cmd: {cmd}");
        }
        if let Some(cmds) = &entry.cmds {
            println!("      cmds: {cmds:?}");
        }
        if !entry.depends_on.is_empty() {
            println!("      depends_on: {:?}", entry.depends_on);
        }
        if !entry.on_success.is_empty() {
            println!("      on_success: {:?}", entry.on_success);
        }
        if !entry.on_fail.is_empty() {
            println!("      on_fail: {:?}", entry.on_fail);
        }
        if let Some(timeout) = entry.timeout_secs {
            println!("      timeout_secs: {timeout}");
        }
    }
    if !cfg.templates().is_empty() {
        println!("templates ({}):", cfg.templates().len());
        for name in cfg.templates().keys() {
            println!("  - {name}");
        }
    }
}
