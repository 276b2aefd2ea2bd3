use thiserror::Error;

/// Errors raised by the lag monitor and the blocking demos.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid monitor config: {0}")]
    InvalidConfig(String),

    #[error("a lag monitor session is already running in this process")]
    AlreadyRunning,

    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("monitor session aborted: {0}")]
    SessionAborted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
