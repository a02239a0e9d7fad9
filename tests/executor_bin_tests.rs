//! End-to-end tests of the standalone executor binary: the JSON-line
//! status protocol on stdout and the process exit-code conventions.

use std::process::Stdio;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

use taskexec::task::{StatusUpdate, TaskState};

fn executor_cmd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_taskexec"));
    cmd.stdout(Stdio::piped()).stderr(Stdio::null());
    cmd
}

fn states_of(stdout: &[u8]) -> Vec<TaskState> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| {
            serde_json::from_str::<StatusUpdate>(line)
                .expect("stdout line is not a status update")
                .state
        })
        .collect()
}

#[tokio::test]
async fn finished_task_emits_running_then_finished_and_exits_zero() {
    let output = timeout(
        Duration::from_secs(10),
        executor_cmd()
            .args(["--task-id", "t-ok", "--grace-timeout-secs", "1", "true"])
            .output(),
    )
    .await
    .expect("executor did not exit")
    .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        states_of(&output.stdout),
        vec![TaskState::Running, TaskState::Finished]
    );
}

#[tokio::test]
async fn failing_task_emits_failed_but_stops_cleanly() {
    let output = timeout(
        Duration::from_secs(10),
        executor_cmd()
            .args(["--task-id", "t-fail", "--grace-timeout-secs", "1", "false"])
            .output(),
    )
    .await
    .expect("executor did not exit")
    .unwrap();

    // The task's failure travels in the FAILED update; the driver stop
    // itself is clean.
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        states_of(&output.stdout),
        vec![TaskState::Running, TaskState::Failed]
    );
}

#[tokio::test]
async fn malformed_params_do_not_fail_the_launch() {
    let output = timeout(
        Duration::from_secs(10),
        executor_cmd()
            .args([
                "--task-id",
                "t-params",
                "--grace-timeout-secs",
                "1",
                "--params",
                "{not json",
                "true",
            ])
            .output(),
    )
    .await
    .expect("executor did not exit")
    .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert!(states_of(&output.stdout).contains(&TaskState::Finished));
}

#[tokio::test]
async fn interrupt_kills_the_task_and_exits_128_plus_sigint() {
    let mut child = executor_cmd()
        .args([
            "--task-id",
            "t-int",
            "--grace-timeout-secs",
            "1",
            "sleep",
            "30",
        ])
        .spawn()
        .unwrap();
    let stdout = child.stdout.take().unwrap();
    let mut lines = BufReader::new(stdout).lines();

    // Wait for RUNNING so the signal router is installed and the child is up.
    loop {
        let line = timeout(Duration::from_secs(10), lines.next_line())
            .await
            .expect("timed out waiting for RUNNING")
            .unwrap()
            .expect("stdout closed before RUNNING");
        let update: StatusUpdate = serde_json::from_str(&line).unwrap();
        if update.state == TaskState::Running {
            break;
        }
    }

    let pid = Pid::from_raw(child.id().unwrap() as i32);
    let signalled_at = Instant::now();
    kill(pid, Signal::SIGINT).unwrap();

    let status = timeout(Duration::from_secs(10), child.wait())
        .await
        .expect("executor did not exit after SIGINT")
        .unwrap();
    assert_eq!(status.code(), Some(128 + Signal::SIGINT as i32));
    // The whole escalation is bounded by the one-second grace window.
    assert!(signalled_at.elapsed() < Duration::from_secs(5));
}
