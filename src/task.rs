use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lifecycle state of the supervised task.
///
/// Transitions are monotonic: `Staging -> Running ->` exactly one terminal
/// state, with no transition out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Staging,
    Running,
    Finished,
    Failed,
    Killed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::Killed
        )
    }

    /// Whether moving from `self` to `next` is an allowed transition.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        match (self, next) {
            (TaskState::Staging, TaskState::Running) => true,
            (TaskState::Staging | TaskState::Running, n) if n.is_terminal() => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Staging => write!(f, "staging"),
            TaskState::Running => write!(f, "running"),
            TaskState::Finished => write!(f, "finished"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Killed => write!(f, "killed"),
        }
    }
}

/// A single unit of work assigned by the orchestrator to this executor.
///
/// Immutable for the executor's lifetime; exactly one exists per instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Argument vector executed verbatim, no shell interpretation.
    pub command: Vec<String>,
    /// Opaque structured parameters; context only, never load-bearing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            id: id.into(),
            command,
            params: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// Decode a raw parameter payload. Failures map to `MalformedPayload`,
/// which callers treat as non-fatal.
pub fn parse_params(raw: &str) -> Result<serde_json::Value> {
    Ok(serde_json::from_str(raw)?)
}

/// One task-state transition, as sent to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub task_id: String,
    pub state: TaskState,
    pub timestamp: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(task_id: impl Into<String>, state: TaskState) -> Self {
        Self {
            task_id: task_id.into(),
            state,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_is_reachable_only_from_staging() {
        assert!(TaskState::Staging.can_transition_to(TaskState::Running));
        assert!(!TaskState::Running.can_transition_to(TaskState::Running));
        assert!(!TaskState::Finished.can_transition_to(TaskState::Running));
    }

    #[test]
    fn terminal_states_admit_no_transitions() {
        for terminal in [TaskState::Finished, TaskState::Failed, TaskState::Killed] {
            for next in [
                TaskState::Staging,
                TaskState::Running,
                TaskState::Finished,
                TaskState::Failed,
                TaskState::Killed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn failed_is_reachable_without_running() {
        // Spawn failure reports FAILED with no prior RUNNING.
        assert!(TaskState::Staging.can_transition_to(TaskState::Failed));
    }

    #[test]
    fn task_state_serializes_screaming() {
        let json = serde_json::to_string(&TaskState::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
        let json = serde_json::to_string(&TaskState::Killed).unwrap();
        assert_eq!(json, "\"KILLED\"");
    }

    #[test]
    fn status_update_round_trips() {
        let update = StatusUpdate::new("task-1", TaskState::Finished);
        let json = serde_json::to_string(&update).unwrap();
        let back: StatusUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, "task-1");
        assert_eq!(back.state, TaskState::Finished);
    }

    #[test]
    fn parse_params_rejects_malformed_input() {
        assert!(parse_params("{\"retries\": 3}").is_ok());
        assert!(parse_params("{not json").is_err());
    }
}
