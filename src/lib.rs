//! Single-task executor for a cluster orchestrator.
//!
//! An executor instance is launched on a worker node to run exactly one
//! task, supervise it to completion, and report its lifecycle back to the
//! orchestrator. The hard part is termination: a task can end because it
//! exited on its own, because the orchestrator asked for a kill or a
//! shutdown, or because the executor itself received a signal. In every
//! case the escalating kill sequence (SIGTERM to the child, then a grace
//! window, then SIGKILL to the whole process group) must run exactly once,
//! no matter how many of those triggers fire concurrently.
//!
//! # Components
//!
//! - [`Supervisor`](supervisor::Supervisor): owns the single task, runs it,
//!   classifies the outcome, and drives reporting and finalization
//! - [`TerminationCoordinator`](termination::TerminationCoordinator):
//!   at-most-once escalating shutdown of the child's process group
//! - [`StatusReporter`](reporter::StatusReporter): transition-checked,
//!   failure-tolerant status updates
//! - [`install_signal_router`](signals::install_signal_router): routes
//!   signals delivered to the executor into the same finalization path

pub mod config;
pub mod driver;
pub mod error;
pub mod process;
pub mod reporter;
pub mod signals;
pub mod supervisor;
pub mod task;
pub mod termination;
