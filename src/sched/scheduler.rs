// src/sched/scheduler.rs

//! Fixed-interval dependency poll.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::exec::executor;
use crate::orchestrator::BatchCore;

/// How often waiting tasks are re-examined for promotion.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Scan all waiting tasks at a fixed interval, promoting each the moment
/// every dependency is Success or Skipped.
///
/// The loop tears itself down when:
/// - every task is terminal (batch finished),
/// - the kill switch fires (nothing may revive work against a cleared
///   process table), or
/// - the batch is stalled: nothing is in flight and the remaining waiting
///   tasks are blocked by a failed or aborted dependency. The stuck tasks
///   stay Waiting; they are reported through the core's stalled list.
pub(crate) async fn poll_loop(core: Arc<BatchCore>) {
    let mut cancel_rx = core.cancel.subscribe();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                promote_ready(&core);

                if core.registry.all_terminal() {
                    debug!("all tasks terminal; stopping dependency poll");
                    break;
                }

                let stuck = core.registry.stalled_waiting();
                if !stuck.is_empty() {
                    for task in &stuck {
                        warn!(
                            task = %task,
                            "task is permanently blocked by a failed or aborted dependency"
                        );
                    }
                    let mut stalled = core
                        .stalled
                        .lock()
                        .expect("stalled list mutex poisoned");
                    *stalled = stuck;
                    debug!("batch stalled; stopping dependency poll");
                    break;
                }
            }

            _ = cancel_rx.changed() => {
                debug!("kill switch fired; stopping dependency poll");
                break;
            }
        }
    }
}

/// Promote every waiting task whose dependencies are satisfied and hand it
/// to the executor. No concurrency cap: everything ready starts now.
fn promote_ready(core: &Arc<BatchCore>) {
    let ready = core.registry.take_ready_waiting();
    for task in ready {
        match core.definition(&task) {
            Some(def) => {
                debug!(task = %task, "dependencies satisfied; dispatching");
                executor::spawn_task(core.clone(), def);
            }
            None => {
                // Registry and definition map are seeded together, so this
                // indicates a bug rather than a user error.
                warn!(task = %task, "promoted task has no definition; ignoring");
            }
        }
    }
}
