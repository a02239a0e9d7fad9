//! Task-state reporting to the orchestrator.
//!
//! The reporter owns the transition rules: updates that are not allowed
//! transitions (a second terminal state, anything after a terminal state)
//! are dropped with a warning. Transport failures are logged and swallowed;
//! a status-send failure must never keep the executor from terminating,
//! because the orchestrator will eventually reconcile a silent worker as
//! lost.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::driver::OrchestratorClient;
use crate::task::{StatusUpdate, TaskState};

pub struct StatusReporter<C: OrchestratorClient> {
    client: Arc<C>,
    last: Mutex<Option<TaskState>>,
}

impl<C: OrchestratorClient> StatusReporter<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            last: Mutex::new(None),
        }
    }

    /// Report one transition for the supervised task.
    ///
    /// The lock is held across the send so concurrent reports cannot reach
    /// the orchestrator out of order; RUNNING therefore always precedes the
    /// terminal update.
    pub async fn report(&self, task_id: &str, state: TaskState) {
        let mut last = self.last.lock().await;

        let allowed = match *last {
            Some(prev) => prev.can_transition_to(state),
            // The first report skips STAGING: the orchestrator set that
            // before handing the task over.
            None => state != TaskState::Staging,
        };
        if !allowed {
            warn!(task_id, from = ?*last, to = %state, "Dropping disallowed status transition");
            return;
        }
        *last = Some(state);

        match self
            .client
            .send_status_update(StatusUpdate::new(task_id, state))
            .await
        {
            Ok(()) => info!(task_id, state = %state, "Sent status update"),
            Err(e) => {
                warn!(task_id, state = %state, error = %e, "Status update failed, continuing")
            }
        }
    }
}
