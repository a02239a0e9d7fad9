use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to spawn task process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Malformed task parameters: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("Status update could not be delivered: {0}")]
    ReportTransport(String),

    #[error("Signal delivery failed: {0}")]
    Signal(nix::errno::Errno),

    #[error("Supervision error: {0}")]
    Supervision(String),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
