use thiserror::Error;

/// Errors produced by the wcon protocol and server layers.
#[derive(Debug, Error)]
pub enum WconError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("supervisor error: {0}")]
    Supervisor(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for WconError {
    fn from(e: serde_json::Error) -> Self {
        WconError::Codec(e.to_string())
    }
}

pub type WconResult<T> = Result<T, WconError>;
