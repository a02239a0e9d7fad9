//! The single-task supervision state machine.
//!
//! `IDLE -> LAUNCHING -> RUNNING -> {FINISHED, FAILED, KILLED}`.
//!
//! The supervisor owns the one process handle this executor will ever
//! have, runs the child on a dedicated task, reconciles its exit code with
//! any pending termination request, and publishes exactly one terminal
//! [`TaskOutcome`]. The binary turns that outcome into the final,
//! unconditional process exit; tests await it in-process instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::Signal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::ExecutorConfig;
use crate::driver::OrchestratorClient;
use crate::error::Result;
use crate::process::{ProcessGroup, ProcessHandle};
use crate::reporter::StatusReporter;
use crate::signals;
use crate::task::{StatusUpdate, Task, TaskState};
use crate::termination::TerminationCoordinator;

/// Clean driver stop: the terminal state was reached and reported.
pub const EXIT_CLEAN: i32 = 0;
/// Unclean stop: supervision itself failed.
pub const EXIT_UNCLEAN: i32 = 1;
/// The launch could not be set up (spawn failure, rejected launch).
pub const EXIT_LAUNCH_FAILURE: i32 = 2;

/// Terminal result of supervising the task, including the exit code the
/// executor process should terminate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOutcome {
    pub state: TaskState,
    pub exit_code: i32,
}

#[derive(Default)]
struct LaunchSlot {
    task_id: Option<String>,
    group: Option<ProcessGroup>,
    /// A termination request arrived before the child was spawned; the run
    /// path honors it as soon as the group exists.
    kill_pending: bool,
}

struct Inner<C: OrchestratorClient> {
    client: Arc<C>,
    reporter: StatusReporter<C>,
    coordinator: TerminationCoordinator,
    slot: Mutex<LaunchSlot>,
    launched: AtomicBool,
    /// Set the moment an orchestrator kill or shutdown arrives. Distinct
    /// from the coordinator's cleanup state: this one classifies the exit
    /// (KILLED vs FAILED), and self-signals do not set it.
    kill_requested: AtomicBool,
    outcome_recorded: AtomicBool,
    halting: AtomicBool,
    outcome_tx: watch::Sender<Option<TaskOutcome>>,
    outcome_rx: watch::Receiver<Option<TaskOutcome>>,
}

/// Cheap clone handle; all state lives behind one `Arc`.
pub struct Supervisor<C: OrchestratorClient> {
    inner: Arc<Inner<C>>,
}

impl<C: OrchestratorClient> Clone for Supervisor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: OrchestratorClient> Supervisor<C> {
    pub fn new(config: ExecutorConfig, client: Arc<C>) -> Self {
        let (outcome_tx, outcome_rx) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                reporter: StatusReporter::new(Arc::clone(&client)),
                coordinator: TerminationCoordinator::new(config.grace_timeout),
                client,
                slot: Mutex::new(LaunchSlot::default()),
                launched: AtomicBool::new(false),
                kill_requested: AtomicBool::new(false),
                outcome_recorded: AtomicBool::new(false),
                halting: AtomicBool::new(false),
                outcome_tx,
                outcome_rx,
            }),
        }
    }

    pub fn on_registered(&self) {
        info!("Registered with orchestrator");
    }

    pub fn on_reregistered(&self) {
        info!("Re-registered with orchestrator");
    }

    pub fn on_disconnected(&self) {
        info!("Disconnected from orchestrator");
    }

    /// Launch the task on a dedicated run task and return immediately.
    ///
    /// Rejected when a task is already being supervised: the offending task
    /// is reported FAILED, the driver is asked to stop, and the recorded
    /// outcome carries the launch-failure exit code.
    pub async fn on_launch_task(&self, task: Task) {
        info!(task_id = %task.id, command = ?task.command, "Launch requested");
        if task.params.is_some() {
            debug!(task_id = %task.id, "Task carries a parameter payload");
        }

        if self.inner.launched.swap(true, Ordering::SeqCst) {
            error!(task_id = %task.id, "Launch rejected: already supervising a task");
            // Bypass the reporter: its transition state belongs to the task
            // we are actually supervising.
            if let Err(e) = self
                .inner
                .client
                .send_status_update(StatusUpdate::new(task.id.as_str(), TaskState::Failed))
                .await
            {
                warn!(task_id = %task.id, error = %e, "Status update failed, continuing");
            }
            self.inner.client.stop().await;
            self.record_outcome(TaskOutcome {
                state: TaskState::Failed,
                exit_code: EXIT_LAUNCH_FAILURE,
            });
            return;
        }

        self.inner.slot.lock().await.task_id = Some(task.id.clone());

        let supervisor = self.clone();
        tokio::spawn(async move { supervisor.run(task).await });
    }

    /// Orchestrator kill request. Only the supervised task is affected;
    /// anything else is logged and ignored.
    pub async fn on_kill_task(&self, task_id: &str) {
        let matches = self.inner.slot.lock().await.task_id.as_deref() == Some(task_id);
        if !matches {
            warn!(task_id, "Kill requested for unknown task, ignoring");
            return;
        }
        info!(task_id, "Kill requested");
        self.request_termination().await;
    }

    /// Orchestrator shutdown: terminate the task unconditionally.
    pub async fn on_shutdown(&self) {
        info!("Shutdown requested");
        self.request_termination().await;
    }

    /// Record the request and start the escalation on its own task so the
    /// callback dispatcher is never blocked behind the grace window.
    async fn request_termination(&self) {
        self.inner.kill_requested.store(true, Ordering::SeqCst);

        let group = {
            let mut slot = self.inner.slot.lock().await;
            match slot.group {
                Some(group) => Some(group),
                None => {
                    slot.kill_pending = true;
                    None
                }
            }
        };

        if let Some(group) = group {
            let supervisor = self.clone();
            tokio::spawn(async move { supervisor.inner.coordinator.terminate(group).await });
        }
    }

    /// Wait for the terminal outcome of the supervised task.
    pub async fn wait_terminal(&self) -> TaskOutcome {
        let mut rx = self.inner.outcome_rx.clone();
        loop {
            if let Some(outcome) = *rx.borrow_and_update() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // The sender lives as long as the supervisor; treat a lost
                // channel as a supervision failure rather than hanging.
                return TaskOutcome {
                    state: TaskState::Failed,
                    exit_code: EXIT_UNCLEAN,
                };
            }
        }
    }

    /// Terminal action of the state machine: best-effort cleanup, then halt
    /// the executor process with `exit_code`. The first caller wins; any
    /// concurrent caller parks until the process dies so it cannot race for
    /// a different exit code.
    pub async fn finalize(&self, exit_code: i32) {
        if self.inner.halting.swap(true, Ordering::SeqCst) {
            std::future::pending::<()>().await;
            return;
        }

        let group = self.inner.slot.lock().await.group;
        if let Some(group) = group {
            self.inner.coordinator.terminate(group).await;
        }

        info!(exit_code, "Executor halting");
        std::process::exit(exit_code);
    }

    /// Finalization entry for the signal path: exit code `128 + n`.
    pub async fn finalize_from_signal(&self, signum: i32) {
        self.finalize(signals::exit_code(signum)).await;
    }

    async fn run(&self, task: Task) {
        let outcome = match self.run_inner(&task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Unexpected supervision error");
                self.inner.reporter.report(&task.id, TaskState::Failed).await;
                TaskOutcome {
                    state: TaskState::Failed,
                    exit_code: EXIT_UNCLEAN,
                }
            }
        };
        self.record_outcome(outcome);
    }

    async fn run_inner(&self, task: &Task) -> Result<TaskOutcome> {
        let mut handle = match ProcessHandle::spawn(&task.command) {
            Ok(handle) => handle,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Failed to spawn task process");
                self.inner.reporter.report(&task.id, TaskState::Failed).await;
                return Ok(TaskOutcome {
                    state: TaskState::Failed,
                    exit_code: EXIT_LAUNCH_FAILURE,
                });
            }
        };
        let group = handle.group();
        info!(task_id = %task.id, pid = group.pid(), "Task process started");

        let (stdout, stderr) = handle.take_output();
        forward_output(&task.id, stdout, stderr);

        // Publish the group and pick up any kill that raced the spawn.
        let kill_pending = {
            let mut slot = self.inner.slot.lock().await;
            slot.group = Some(group);
            slot.kill_pending
        };
        if kill_pending {
            let supervisor = self.clone();
            tokio::spawn(async move { supervisor.inner.coordinator.terminate(group).await });
        }

        self.inner.reporter.report(&task.id, TaskState::Running).await;

        let exit_code = handle.wait().await?;
        info!(task_id = %task.id, exit_code, "Task process exited");

        // Catch stray descendants the child failed to reap.
        if let Err(e) = group.signal_group(Signal::SIGTERM) {
            warn!(pgid = group.pgid(), error = %e, "Post-exit group signal failed");
        }

        let state = if exit_code == 0 {
            TaskState::Finished
        } else if self.inner.kill_requested.load(Ordering::SeqCst) {
            TaskState::Killed
        } else {
            TaskState::Failed
        };
        self.inner.reporter.report(&task.id, state).await;

        Ok(TaskOutcome {
            state,
            exit_code: EXIT_CLEAN,
        })
    }

    fn record_outcome(&self, outcome: TaskOutcome) {
        if self.inner.outcome_recorded.swap(true, Ordering::SeqCst) {
            warn!(state = %outcome.state, "Terminal outcome already recorded, dropping");
            return;
        }
        info!(state = %outcome.state, exit_code = outcome.exit_code, "Task reached terminal state");
        let _ = self.inner.outcome_tx.send(Some(outcome));
    }
}

/// Relay the child's output into the executor's log. Both pipes are always
/// consumed so the child cannot stall on a full buffer.
fn forward_output(task_id: &str, stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) {
    if let Some(stdout) = stdout {
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task_id = %task_id, "stdout: {}", line);
            }
        });
    }

    if let Some(stderr) = stderr {
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task_id = %task_id, "stderr: {}", line);
            }
        });
    }
}
