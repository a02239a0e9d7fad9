//! Escalating, at-most-once termination of the supervised process group.
//!
//! The coordinator is the only component allowed to send termination
//! signals. Its escalation sequence runs at most once for the lifetime of
//! the handle, no matter how many callers race into it: the run path after
//! an unexpected failure, an orchestrator kill or shutdown callback, and
//! the signal path may all invoke [`TerminationCoordinator::terminate`]
//! concurrently.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::process::ProcessGroup;

const NOT_STARTED: u8 = 0;
const IN_PROGRESS: u8 = 1;
const DONE: u8 = 2;

/// Drives a process group to termination, exactly once.
#[derive(Debug)]
pub struct TerminationCoordinator {
    state: AtomicU8,
    done_tx: watch::Sender<bool>,
    grace_timeout: Duration,
}

impl TerminationCoordinator {
    pub fn new(grace_timeout: Duration) -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            state: AtomicU8::new(NOT_STARTED),
            done_tx,
            grace_timeout,
        }
    }

    /// Escalate the group to termination: SIGTERM the leader if it is still
    /// alive, sleep out the grace window unconditionally, then SIGKILL the
    /// entire group. Returns `true` if this call performed the escalation.
    ///
    /// A caller that loses the race waits until the in-flight escalation
    /// has completed before returning, so the group is guaranteed dead (or
    /// at least SIGKILLed) whenever `terminate` resolves.
    ///
    /// Known limitation: if the leader PID is recycled between the liveness
    /// probe and the signal, the SIGTERM may reach an unrelated process.
    /// The forceful phase targets the group id, which is not recycled on
    /// that timescale.
    pub async fn terminate(&self, group: ProcessGroup) -> bool {
        if self
            .state
            .compare_exchange(NOT_STARTED, IN_PROGRESS, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.wait_done().await;
            return false;
        }

        if group.leader_alive() {
            info!(pid = group.pid(), "Sending SIGTERM to task process");
            if let Err(e) = group.signal_leader(Signal::SIGTERM) {
                warn!(pid = group.pid(), error = %e, "Graceful signal failed");
            }
        }

        // The grace window is not skipped for an already-dead leader: its
        // descendants may still be reacting to the forwarded signal.
        tokio::time::sleep(self.grace_timeout).await;

        info!(pgid = group.pgid(), "Sending SIGKILL to process group");
        if let Err(e) = group.signal_group(Signal::SIGKILL) {
            warn!(pgid = group.pgid(), error = %e, "Forceful group kill failed");
        }

        self.state.store(DONE, Ordering::Release);
        let _ = self.done_tx.send(true);
        true
    }

    /// Whether the escalation has started (possibly not yet finished).
    pub fn has_run(&self) -> bool {
        self.state.load(Ordering::Acquire) != NOT_STARTED
    }

    async fn wait_done(&self) {
        let mut rx = self.done_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessHandle;
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_terminates_escalate_exactly_once() {
        let mut handle = ProcessHandle::spawn(&["sleep".into(), "30".into()]).unwrap();
        let group = handle.group();
        let coordinator = Arc::new(TerminationCoordinator::new(Duration::from_millis(100)));

        let (a, b) = tokio::join!(coordinator.terminate(group), coordinator.terminate(group));
        assert!(a ^ b, "exactly one caller must perform the escalation");

        let code = handle.wait().await.unwrap();
        assert_ne!(code, 0);
        assert!(!group.leader_alive());
    }

    #[tokio::test]
    async fn terminate_after_done_is_a_noop() {
        let mut handle = ProcessHandle::spawn(&["sleep".into(), "30".into()]).unwrap();
        let group = handle.group();
        let coordinator = TerminationCoordinator::new(Duration::from_millis(50));

        assert!(coordinator.terminate(group).await);
        assert!(!coordinator.terminate(group).await);
        assert!(coordinator.has_run());

        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn terminating_an_exited_process_completes_cleanly() {
        let mut handle = ProcessHandle::spawn(&["true".into()]).unwrap();
        let group = handle.group();
        handle.wait().await.unwrap();

        let coordinator = TerminationCoordinator::new(Duration::from_millis(50));
        assert!(coordinator.terminate(group).await);
    }

    #[tokio::test]
    async fn losing_caller_returns_only_after_escalation_finishes() {
        let mut handle = ProcessHandle::spawn(&["sleep".into(), "30".into()]).unwrap();
        let group = handle.group();
        let coordinator = Arc::new(TerminationCoordinator::new(Duration::from_millis(200)));

        let winner = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.terminate(group).await })
        };
        // Let the winner claim the escalation before racing it.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        let lost = coordinator.terminate(group).await;
        assert!(!lost);
        // The loser sat out the remainder of the winner's grace window.
        assert!(started.elapsed() >= Duration::from_millis(100));

        assert!(winner.await.unwrap());
        let code = handle.wait().await.unwrap();
        assert_ne!(code, 0);
    }
}
