// src/exec/process.rs

//! Process manager: command spawning, output streaming, and kill-all.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::state::SharedRegistry;
use crate::task::{TaskDefinition, TaskId, TaskResult};

/// Grace period between the termination request and the forced kill.
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Note appended to a task's output when it is killed by the user.
pub const ABORT_NOTE: &str = "[task aborted by user]";

/// How a single command invocation ended.
#[derive(Debug)]
pub enum CommandEnd {
    /// The process exited on its own; the result carries the exit status
    /// and captured output.
    Completed(TaskResult),
    /// The process was killed (kill-all or per-task timeout). The registry
    /// has already been marked Aborted by the kill path; the caller must
    /// not record a terminal state or dispatch callbacks.
    Interrupted,
}

/// Handle to a live external process, keyed by task id.
///
/// Dropped from the table the moment the process completes, or forcibly on
/// kill-all.
struct ProcessHandle {
    cancel: oneshot::Sender<()>,
}

/// Launches task commands and tracks every live process so the whole batch
/// can be cancelled at once.
#[derive(Default)]
pub struct ProcessManager {
    active: Mutex<HashMap<TaskId, ProcessHandle>>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live process handles (diagnostics only).
    pub fn active_count(&self) -> usize {
        self.active.lock().expect("process table mutex poisoned").len()
    }

    /// Run one command line for a task, streaming combined stdout/stderr
    /// into the registry as it arrives so observers can render partial
    /// output while the process is still running.
    pub async fn run_command(
        &self,
        registry: &SharedRegistry,
        def: &TaskDefinition,
        command_line: &str,
    ) -> Result<CommandEnd> {
        info!(task = %def.id, cmd = %command_line, "starting task process");

        let mut child = spawn_shell(def, command_line)
            .with_context(|| format!("spawning process for task '{}'", def.id))?;

        // Register the live handle before awaiting anything, so a kill-all
        // arriving mid-flight can always reach this process.
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        {
            let mut active = self.active.lock().expect("process table mutex poisoned");
            active.insert(def.id.clone(), ProcessHandle { cancel: cancel_tx });
        }

        let combined = Arc::new(Mutex::new(String::new()));
        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(
                stdout,
                registry.clone(),
                def.id.clone(),
                combined.clone(),
                stdout_buf.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(
                stderr,
                registry.clone(),
                def.id.clone(),
                combined.clone(),
                stderr_buf.clone(),
            ));
        }

        let timeout = async {
            match def.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timeout);

        tokio::select! {
            status_res = child.wait() => {
                for reader in readers {
                    let _ = reader.await;
                }
                self.remove_handle(&def.id);

                let status = status_res
                    .with_context(|| format!("waiting for process of task '{}'", def.id))?;

                let code = status.code();
                debug!(
                    task = %def.id,
                    exit_code = code,
                    success = status.success(),
                    "task process exited"
                );

                let result = TaskResult {
                    success: status.success(),
                    exit_code: code,
                    message: None,
                    output: take_buffer(&combined),
                    stdout: take_buffer(&stdout_buf),
                    stderr: take_buffer(&stderr_buf),
                };
                Ok(CommandEnd::Completed(result))
            }

            cancel = &mut cancel_rx => {
                if cancel.is_err() {
                    debug!(task = %def.id, "cancel channel dropped; treating as kill request");
                }
                // The killer has already marked the task Aborted; our job is
                // only to take the process down.
                terminate_with_grace(&mut child, &def.id).await;
                for reader in readers {
                    let _ = reader.await;
                }
                self.remove_handle(&def.id);
                Ok(CommandEnd::Interrupted)
            }

            _ = &mut timeout => {
                warn!(task = %def.id, timeout = ?def.timeout, "task deadline exceeded; killing process");
                registry.set_aborted(&def.id, "[task timed out]");
                terminate_with_grace(&mut child, &def.id).await;
                for reader in readers {
                    let _ = reader.await;
                }
                self.remove_handle(&def.id);
                Ok(CommandEnd::Interrupted)
            }
        }
    }

    /// Kill every tracked process and mark its task Aborted immediately.
    ///
    /// The abort is deliberately optimistic: the state flips before the OS
    /// confirms termination, and the registry's sticky-Aborted guard stops
    /// the eventual real completion from overwriting it.
    pub fn kill_all(&self, registry: &SharedRegistry) {
        let drained: Vec<(TaskId, ProcessHandle)> = {
            let mut active = self.active.lock().expect("process table mutex poisoned");
            active.drain().collect()
        };

        if drained.is_empty() {
            debug!("kill_all: no live processes");
            return;
        }

        info!(count = drained.len(), "killing all live task processes");
        for (task_id, handle) in drained {
            registry.set_aborted(&task_id, ABORT_NOTE);
            if handle.cancel.send(()).is_err() {
                debug!(task = %task_id, "process already finishing while killing");
            }
        }
    }

    fn remove_handle(&self, task_id: &str) {
        let mut active = self.active.lock().expect("process table mutex poisoned");
        active.remove(task_id);
    }
}

/// Build a platform shell invocation for the command line.
fn spawn_shell(def: &TaskDefinition, command_line: &str) -> std::io::Result<Child> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command_line);
        c
    };

    if let Some(cwd) = &def.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &def.env {
        cmd.env(key, value);
    }

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn()
}

/// Stream lines from a process pipe into the registry and the capture
/// buffers as they arrive.
fn spawn_line_reader<R>(
    stream: R,
    registry: SharedRegistry,
    task_id: TaskId,
    combined: Arc<Mutex<String>>,
    separated: Arc<Mutex<String>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let reader = BufReader::new(stream);
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            registry.append_output(&task_id, &line);
            registry.append_output(&task_id, "\n");
            push_line(&combined, &line);
            push_line(&separated, &line);
        }
    })
}

fn push_line(buf: &Arc<Mutex<String>>, line: &str) {
    let mut guard = buf.lock().expect("capture buffer mutex poisoned");
    guard.push_str(line);
    guard.push('\n');
}

fn take_buffer(buf: &Arc<Mutex<String>>) -> String {
    std::mem::take(&mut *buf.lock().expect("capture buffer mutex poisoned"))
}

/// Ask the process to stop, then force-kill if it outlives the grace period.
async fn terminate_with_grace(child: &mut Child, task_id: &str) {
    if let Err(err) = child.start_kill() {
        debug!(task = %task_id, error = %err, "termination request failed; process likely exited");
    }

    tokio::select! {
        _ = child.wait() => {
            debug!(task = %task_id, "process exited within the grace period");
        }
        _ = tokio::time::sleep(KILL_GRACE) => {
            warn!(task = %task_id, "process survived the grace period; force killing");
            if let Err(err) = child.kill().await {
                warn!(task = %task_id, error = %err, "failed to force-kill process");
            }
        }
    }
}
