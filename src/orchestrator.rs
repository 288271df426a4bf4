// src/orchestrator.rs

//! Run driver: seeds the registry for a batch, applies `when`-gating,
//! kicks off the dependency poll, and exposes the kill switch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::errors::{Result, TaskloomError};
use crate::exec::executor;
use crate::exec::ProcessManager;
use crate::sched;
use crate::state::{SharedRegistry, TaskSnapshot};
use crate::task::{TaskDefinition, TaskId};

/// Poll interval used by [`Orchestrator::wait_idle`].
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Shared state of one orchestrator instance.
///
/// The executor, callback system, and scheduler all operate on this core;
/// nothing in the crate is a process-wide singleton.
pub(crate) struct BatchCore {
    pub registry: SharedRegistry,
    /// Concrete definitions of the current batch, including callback tasks
    /// materialized from templates mid-flight.
    pub definitions: Mutex<HashMap<TaskId, Arc<TaskDefinition>>>,
    /// Reusable definitions not run by default; deep-copied into the batch
    /// the first time a callback references them.
    pub templates: Mutex<HashMap<TaskId, Arc<TaskDefinition>>>,
    pub processes: ProcessManager,
    /// Kill switch; flipping to true tears down the dependency poll.
    pub cancel: watch::Sender<bool>,
    /// Tasks the scheduler found permanently blocked, reported once the
    /// poll loop stops.
    pub stalled: Mutex<Vec<TaskId>>,
    /// Terminal transitions whose callback bookkeeping is still in flight;
    /// used by `wait_idle` to avoid sampling between a terminal write and
    /// the creation of its callback records.
    pub dispatching: AtomicUsize,
}

impl BatchCore {
    fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            registry: SharedRegistry::new(),
            definitions: Mutex::new(HashMap::new()),
            templates: Mutex::new(HashMap::new()),
            processes: ProcessManager::new(),
            cancel,
            stalled: Mutex::new(Vec::new()),
            dispatching: AtomicUsize::new(0),
        }
    }

    pub fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn definition(&self, id: &str) -> Option<Arc<TaskDefinition>> {
        self.definitions
            .lock()
            .expect("definitions mutex poisoned")
            .get(id)
            .cloned()
    }
}

/// Top-level entry point for running task batches.
///
/// Cheap to clone; all clones share the same registry, process table, and
/// kill switch.
#[derive(Clone)]
pub struct Orchestrator {
    core: Arc<BatchCore>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            core: Arc::new(BatchCore::new()),
        }
    }

    /// Register a reusable template, materialized into a concrete task the
    /// first time a callback references its id.
    pub fn register_template(&self, def: TaskDefinition) {
        let mut templates = self
            .core
            .templates
            .lock()
            .expect("templates mutex poisoned");
        templates.insert(def.id.clone(), Arc::new(def));
    }

    /// Seed and launch a batch of tasks.
    ///
    /// Clears any previous batch, gates `when` predicates, classifies tasks
    /// as ready or waiting, dispatches every ready task in parallel, and
    /// starts the dependency poll. Returns as soon as the batch is
    /// launched; use [`wait_idle`] or [`is_batch_complete`] to observe
    /// completion.
    ///
    /// A definition without an id is rejected with an error log and does
    /// not affect the rest of the batch. A duplicate id re-initializes the
    /// earlier record (last definition wins).
    ///
    /// [`wait_idle`]: Orchestrator::wait_idle
    /// [`is_batch_complete`]: Orchestrator::is_batch_complete
    pub fn run_batch(&self, defs: Vec<TaskDefinition>) -> Result<()> {
        let core = &self.core;

        // Reset per-batch state.
        core.registry.clear();
        core.cancel.send_replace(false);
        core.stalled
            .lock()
            .expect("stalled list mutex poisoned")
            .clear();
        {
            let mut definitions = core
                .definitions
                .lock()
                .expect("definitions mutex poisoned");
            definitions.clear();
        }

        // Seed the registry.
        let mut seeded: Vec<Arc<TaskDefinition>> = Vec::new();
        for def in defs {
            if def.id.is_empty() {
                error!("task definition without an id rejected; skipping it");
                continue;
            }
            let def = Arc::new(def);
            core.registry.initialize(&def);
            core.definitions
                .lock()
                .expect("definitions mutex poisoned")
                .insert(def.id.clone(), def.clone());
            seeded.push(def);
        }

        // Pass 1: `when` gating, evaluated exactly once per seeded task.
        for def in &seeded {
            if let Some(when) = &def.when {
                if !when() {
                    debug!(task = %def.id, "when predicate false; skipping task");
                    core.registry.set_skipped(&def.id);
                }
            }
        }

        // Pass 2: tasks with unmet dependencies wait for the poll.
        for def in &seeded {
            if !def.depends_on.is_empty() {
                core.registry.set_waiting(&def.id);
            }
        }

        // Pass 3: everything still Pending starts now, all in parallel.
        let mut launched = 0usize;
        for def in &seeded {
            if core.registry.claim_for_launch(&def.id) {
                executor::spawn_task(core.clone(), def.clone());
                launched += 1;
            }
        }

        info!(
            seeded = seeded.len(),
            launched,
            "batch seeded; starting dependency poll"
        );
        tokio::spawn(sched::poll_loop(core.clone()));
        Ok(())
    }

    /// Kill every live process and tear down the poll loop.
    ///
    /// Running tasks flip to Aborted immediately, before the OS confirms
    /// termination; tasks that never started simply never run.
    pub fn kill_all(&self) {
        info!("kill-all requested");
        self.core.processes.kill_all(&self.core.registry);
        self.core.cancel.send_replace(true);
    }

    /// True iff every task in the current batch is in a terminal state.
    pub fn is_batch_complete(&self) -> bool {
        self.core.registry.all_terminal()
    }

    /// Point-in-time snapshot of every task, sorted by id.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.core.registry.snapshot()
    }

    /// State of one task, if it exists in the current batch.
    pub fn state_of(&self, id: &str) -> Option<crate::state::TaskLifecycle> {
        self.core.registry.state_of(id)
    }

    /// Wait until the batch can make no further progress.
    ///
    /// Resolves `Ok` when every task is terminal or the batch was killed;
    /// resolves `Err(BatchStalled)` when the scheduler found tasks
    /// permanently blocked by a failed or aborted dependency.
    pub async fn wait_idle(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(IDLE_POLL);
        loop {
            ticker.tick().await;

            {
                let stalled = self
                    .core
                    .stalled
                    .lock()
                    .expect("stalled list mutex poisoned");
                if !stalled.is_empty() {
                    return Err(TaskloomError::BatchStalled(stalled.clone()));
                }
            }

            if self.core.cancelled() {
                return Ok(());
            }

            if self.core.registry.all_terminal()
                && self.core.dispatching.load(Ordering::SeqCst) == 0
            {
                return Ok(());
            }
        }
    }
}
