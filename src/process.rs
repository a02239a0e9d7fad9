//! Ownership of the single OS process supervised by this executor.
//!
//! The child is spawned as the leader of a fresh process group so the whole
//! tree it creates can be targeted with one group signal. `ProcessHandle`
//! stays with the run path (only it waits and records the exit code);
//! termination paths get a copyable [`ProcessGroup`] so they can probe and
//! signal without borrowing the child.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::error::{ExecutorError, Result};

/// Signalling view of the supervised process: the leader's PID and the
/// process-group id, equal by construction.
#[derive(Debug, Clone, Copy)]
pub struct ProcessGroup {
    pid: Pid,
    pgid: Pid,
}

impl ProcessGroup {
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    pub fn pgid(&self) -> i32 {
        self.pgid.as_raw()
    }

    /// Null-signal liveness probe of the group leader. EPERM means the
    /// process exists but belongs to someone else, so it counts as alive.
    pub fn leader_alive(&self) -> bool {
        match kill(self.pid, None) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    /// Send `signal` to the group leader only. A process that is already
    /// gone is success, not an error.
    pub fn signal_leader(&self, signal: Signal) -> Result<()> {
        match kill(self.pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(ExecutorError::Signal(errno)),
        }
    }

    /// Send `signal` to the entire process group. An already-empty group is
    /// success, not an error.
    pub fn signal_group(&self, signal: Signal) -> Result<()> {
        match killpg(self.pgid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(ExecutorError::Signal(errno)),
        }
    }
}

/// The one OS process this executor instance ever supervises.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    group: ProcessGroup,
    exit_code: Option<i32>,
}

impl ProcessHandle {
    /// Spawn `command` as the leader of a new process group (pgid == pid).
    pub fn spawn(command: &[String]) -> Result<Self> {
        let (program, args) = command.split_first().ok_or_else(|| {
            ExecutorError::Spawn(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty command vector",
            ))
        })?;

        let child = Command::new(program)
            .args(args)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ExecutorError::Spawn)?;

        let pid = child.id().ok_or_else(|| {
            ExecutorError::Spawn(io::Error::new(
                io::ErrorKind::Other,
                "child exited before its pid could be observed",
            ))
        })?;
        let pid = Pid::from_raw(pid as i32);

        Ok(Self {
            child,
            group: ProcessGroup { pid, pgid: pid },
            exit_code: None,
        })
    }

    pub fn group(&self) -> ProcessGroup {
        self.group
    }

    /// Take the child's output pipes. The caller must keep draining them
    /// so the child never blocks on a full pipe buffer.
    pub fn take_output(&mut self) -> (Option<ChildStdout>, Option<ChildStderr>) {
        (self.child.stdout.take(), self.child.stderr.take())
    }

    /// Wait for the child to exit and record its exit code. A child killed
    /// by signal `n` maps to `128 + n` so callers always see a nonzero code.
    pub async fn wait(&mut self) -> Result<i32> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ExecutorError::Supervision(format!("wait failed: {e}")))?;
        let code = Self::code_of(status);
        self.exit_code = Some(code);
        Ok(code)
    }

    /// Non-blocking completion check; records the exit code when available.
    pub fn poll(&mut self) -> Result<Option<i32>> {
        let status = self
            .child
            .try_wait()
            .map_err(|e| ExecutorError::Supervision(format!("poll failed: {e}")))?;
        if let Some(status) = status {
            self.exit_code = Some(Self::code_of(status));
        }
        Ok(self.exit_code)
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn code_of(status: std::process::ExitStatus) -> i32 {
        match (status.code(), status.signal()) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => -1,
        }
    }
}
