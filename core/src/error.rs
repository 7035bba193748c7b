/// Error types for the coordinator
use thiserror::Error;

/// Failure reported by the answering backend.
///
/// Every failure mode (timeout, transport, non-2xx, malformed body) is folded
/// into one message; `status` is kept when the service actually answered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    pub status: Option<u16>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

#[derive(Error, Debug)]
pub enum AskError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job queue is closed")]
    QueueClosed,
}

impl From<sled::Error> for AskError {
    fn from(e: sled::Error) -> Self {
        AskError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AskError>;
