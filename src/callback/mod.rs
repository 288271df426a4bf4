// src/callback/mod.rs

//! Callback system: resolves and dispatches `on_success` / `on_fail`
//! reactions once a task reaches a terminal state.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::exec::executor;
use crate::orchestrator::BatchCore;
use crate::task::{CallbackAction, TaskDefinition, TaskResult};

/// Dispatch a reaction chain for a finished task.
///
/// Elements run left to right. The display-lineage parent starts at the
/// triggering task and shifts to each task-id element as it is passed, so a
/// run of function callbacks does not break the visual chain, while an
/// interposed task callback re-roots the elements after it.
pub(crate) fn dispatch(
    core: &Arc<BatchCore>,
    actions: &[CallbackAction],
    result: &TaskResult,
    trigger: &str,
) {
    let mut parent = trigger.to_string();

    for action in actions {
        match action {
            CallbackAction::Task(target) => {
                run_callback_task(core, target, &parent);
                parent = target.clone();
            }
            CallbackAction::Func(f) => {
                // Deferred to the next cooperative tick; errors from the
                // callback are reported, never propagated to the scheduler.
                // Counted as in-flight dispatch work so `wait_idle` does not
                // resolve before the function has run.
                core.dispatching.fetch_add(1, Ordering::SeqCst);
                let core = core.clone();
                let f = f.clone();
                let result = result.clone();
                let trigger = trigger.to_string();
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    if let Err(err) = f(&result) {
                        warn!(task = %trigger, error = %err, "callback function failed");
                    }
                    core.dispatching.fetch_sub(1, Ordering::SeqCst);
                });
            }
        }
    }
}

/// Resolve a task-id callback target and launch it if still eligible.
///
/// Targets resolve first among the current batch, then among registered
/// templates; a template is deep-copied into a concrete task on first use.
/// The launch claim guarantees at-most-once execution even when several
/// parents reference the same target, and the actual run is deferred to the
/// next cooperative tick rather than nested inside the completion path.
fn run_callback_task(core: &Arc<BatchCore>, target: &str, parent: &str) {
    let def: Arc<TaskDefinition> = {
        let mut definitions = core
            .definitions
            .lock()
            .expect("definitions mutex poisoned");

        match definitions.get(target) {
            Some(existing) => existing.clone(),
            None => {
                let templates = core.templates.lock().expect("templates mutex poisoned");
                match templates.get(target) {
                    Some(template) => {
                        debug!(task = %target, "materializing callback task from template");
                        let materialized = Arc::new(template.as_ref().clone());
                        definitions.insert(target.to_string(), materialized.clone());
                        materialized
                    }
                    None => {
                        warn!(
                            task = %target,
                            parent = %parent,
                            "callback target not found among tasks or templates; ignoring"
                        );
                        return;
                    }
                }
            }
        }
    };

    if core.registry.adopt_callback(&def, parent) {
        debug!(task = %target, parent = %parent, "launching callback task");
        let core = core.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            executor::run_task(core, def).await;
        });
    } else {
        debug!(
            task = %target,
            parent = %parent,
            "callback task already launched or terminal; not re-triggering"
        );
    }
}
