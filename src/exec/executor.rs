// src/exec/executor.rs

//! Drives a single task definition to a terminal state.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::callback;
use crate::exec::process::CommandEnd;
use crate::orchestrator::BatchCore;
use crate::state::TaskLifecycle;
use crate::task::{
    CommandLines, FnOutcome, HandlerVerdict, TaskAction, TaskContext, TaskDefinition, TaskResult,
};

/// Marker appended to a task's output between the commands of a sequence.
pub const COMMAND_SEPARATOR: &str = "----------------------------------------";

/// Spawn the execution of one task as its own Tokio task.
pub(crate) fn spawn_task(core: Arc<BatchCore>, def: Arc<TaskDefinition>) -> JoinHandle<()> {
    tokio::spawn(async move { run_task(core, def).await })
}

/// Execute one task definition and record its terminal state.
///
/// Dispatch is an exhaustive match on the action: custom handler,
/// in-process function, or command(s). Every terminal write goes through
/// the registry's sticky-Aborted guard, and an applied terminal transition
/// always hands the result to the callback system.
pub(crate) async fn run_task(core: Arc<BatchCore>, def: Arc<TaskDefinition>) {
    if core.cancelled() {
        core.registry
            .set_aborted(&def.id, crate::exec::process::ABORT_NOTE);
        return;
    }

    core.registry.set_running(&def.id);

    match &def.action {
        None => {
            warn!(task = %def.id, "task has nothing to run; treating as vacuous success");
            finish(&core, &def, TaskResult::passed()).await;
        }

        Some(TaskAction::Handler(handler)) => {
            let verdict = handler.run(TaskContext {
                task: &def,
                registry: core.registry.clone(),
            });
            match verdict {
                HandlerVerdict::Success => finish(&core, &def, TaskResult::passed()).await,
                HandlerVerdict::Failed => finish(&core, &def, TaskResult::failed()).await,
                HandlerVerdict::RunCommand(line) => {
                    run_command_lines(&core, &def, CommandLines::Line(line)).await;
                }
                HandlerVerdict::Detached => {
                    debug!(task = %def.id, "handler detached; it owns the terminal transition");
                }
            }
        }

        Some(TaskAction::Function(body)) => {
            let result = match body() {
                FnOutcome::Pass => TaskResult::passed(),
                FnOutcome::Fail => TaskResult::failed(),
                FnOutcome::Report { ok, message } => {
                    let mut result = if ok {
                        TaskResult::passed()
                    } else {
                        TaskResult::failed()
                    };
                    result.message = Some(message);
                    result
                }
            };
            finish(&core, &def, result).await;
        }

        Some(TaskAction::Command(spec)) => {
            let lines = spec.resolve();
            run_command_lines(&core, &def, lines).await;
        }
    }
}

async fn run_command_lines(core: &Arc<BatchCore>, def: &Arc<TaskDefinition>, lines: CommandLines) {
    match lines {
        CommandLines::Empty => {
            warn!(task = %def.id, "task command resolved to nothing; treating as vacuous success");
            finish(core, def, TaskResult::passed()).await;
        }

        CommandLines::Line(line) => match run_single(core, def, &line).await {
            CommandEnd::Completed(result) => finish(core, def, result).await,
            CommandEnd::Interrupted => {}
        },

        CommandLines::Sequence(lines) => {
            let mut last = TaskResult::passed();
            for (index, line) in lines.iter().enumerate() {
                if index > 0 {
                    core.registry.append_output(&def.id, COMMAND_SEPARATOR);
                    core.registry.append_output(&def.id, "\n");
                }
                match run_single(core, def, line).await {
                    CommandEnd::Completed(result) => {
                        if !result.success {
                            // First nonzero exit fails the whole task with
                            // that command's result; the rest never run.
                            debug!(
                                task = %def.id,
                                command = %line,
                                remaining = lines.len() - index - 1,
                                "sequence command failed; aborting remainder"
                            );
                            finish(core, def, result).await;
                            return;
                        }
                        last = result;
                    }
                    CommandEnd::Interrupted => return,
                }
            }
            finish(core, def, last).await;
        }
    }
}

/// Run one command line, short-circuiting the `exit 0` / `exit 1` literals
/// without spawning a process.
async fn run_single(core: &Arc<BatchCore>, def: &Arc<TaskDefinition>, line: &str) -> CommandEnd {
    match line.trim() {
        "exit 0" => CommandEnd::Completed(TaskResult::passed().with_exit_code(0)),
        "exit 1" => CommandEnd::Completed(TaskResult::failed().with_exit_code(1)),
        // A kill-all between launch and spawn would miss a process that is
        // not yet in the table; re-check before spawning.
        _ if core.cancelled() => {
            core.registry
                .set_aborted(&def.id, crate::exec::process::ABORT_NOTE);
            CommandEnd::Interrupted
        }
        _ => match core.processes.run_command(&core.registry, def, line).await {
            Ok(end) => end,
            Err(err) => {
                // Spawn or wait failure: recorded as a task failure, never
                // propagated to the scheduler.
                warn!(task = %def.id, error = %err, "task execution error");
                let note = format!("[execution error: {err}]");
                core.registry.append_output(&def.id, &note);
                core.registry.append_output(&def.id, "\n");
                CommandEnd::Completed(TaskResult::failed().with_message(err.to_string()))
            }
        },
    }
}

/// Record the terminal state and dispatch the matching callback chain.
///
/// When the guarded write is refused (the task was aborted mid-flight),
/// nothing is dispatched: an aborted task must not revive work.
async fn finish(core: &Arc<BatchCore>, def: &Arc<TaskDefinition>, result: TaskResult) {
    // A completion racing kill-all can slip past the process table (the
    // handle may not have been registered when the table was drained), so
    // the kill switch is re-checked here before anything is recorded.
    if core.cancelled() {
        if core.registry.state_of(&def.id) != Some(TaskLifecycle::Aborted) {
            core.registry
                .set_aborted(&def.id, crate::exec::process::ABORT_NOTE);
        }
        debug!(task = %def.id, "batch killed before completion was recorded; task aborted");
        return;
    }

    let state = if result.success {
        TaskLifecycle::Success
    } else {
        TaskLifecycle::Failed
    };

    core.dispatching.fetch_add(1, Ordering::SeqCst);
    let applied = core.registry.safe_set_state(&def.id, state);
    if applied {
        if let Some(message) = &result.message {
            core.registry.append_output(&def.id, message);
            core.registry.append_output(&def.id, "\n");
        }
        let actions = if result.success {
            &def.on_success
        } else {
            &def.on_fail
        };
        callback::dispatch(core, actions, &result, &def.id);
    } else {
        debug!(task = %def.id, "terminal state not applied; skipping callbacks");
    }
    core.dispatching.fetch_sub(1, Ordering::SeqCst);
}
