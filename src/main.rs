use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use taskexec::config::ExecutorConfig;
use taskexec::driver::JsonLineClient;
use taskexec::signals::install_signal_router;
use taskexec::supervisor::Supervisor;
use taskexec::task::{self, Task};

#[derive(Parser, Debug)]
#[command(name = "taskexec")]
#[command(version)]
#[command(about = "Single-task executor: runs one command under supervision for a cluster orchestrator")]
struct Args {
    /// Task identifier assigned by the orchestrator (generated if absent)
    #[arg(long)]
    task_id: Option<String>,

    /// Optional task parameters as a JSON document
    #[arg(long)]
    params: Option<String>,

    /// Seconds between the graceful signal and the forceful group kill
    #[arg(long, default_value_t = 2)]
    grace_timeout_secs: u64,

    /// Command to execute, taken verbatim (no shell interpretation)
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    // Status updates own stdout; everything else goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let task_id = args
        .task_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // Parameters are context, not correctness: malformed input is dropped.
    let params = args.params.as_deref().and_then(|raw| match task::parse_params(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Ignoring malformed task parameters");
            None
        }
    });

    let mut task = Task::new(task_id, args.command);
    if let Some(params) = params {
        task = task.with_params(params);
    }

    let config = ExecutorConfig::default()
        .with_grace_timeout(Duration::from_secs(args.grace_timeout_secs));

    info!(
        pid = std::process::id(),
        task_id = %task.id,
        grace_timeout_secs = args.grace_timeout_secs,
        "Starting executor"
    );

    let supervisor = Supervisor::new(config, Arc::new(JsonLineClient::new()));
    install_signal_router(supervisor.clone());

    supervisor.on_registered();
    supervisor.on_launch_task(task).await;

    let outcome = supervisor.wait_terminal().await;
    supervisor.finalize(outcome.exit_code).await;
}
