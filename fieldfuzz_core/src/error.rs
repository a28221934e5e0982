#![allow(missing_docs)]
use crate::codec::CodecError;
use thiserror::Error;
use tokio::time::error::Elapsed;

/// Custom Result type used in this crate
pub type FuzzResult<T> = Result<T, FuzzError>;

#[derive(Debug, Error)]
pub enum FuzzError {
    #[error("{err_msg}")]
    Custom { err_msg: String },
    #[error("Could not connect to {err_msg}")]
    ConnectionFailed { err_msg: String },
    #[error("Could not write to the transport")]
    TransporterWrite,
    #[error("Could not read from the transport")]
    TransporterRead,
    #[error("Unknown protocol `{name}`")]
    UnknownProtocol { name: String },
    #[error("Unknown I/O interface `{name}`")]
    UnknownIoInterface { name: String },
    #[error("Unknown device `{name}`")]
    UnknownDevice { name: String },
    #[error("Unknown message type `{name}` for protocol {protocol}")]
    UnknownMessage { protocol: String, name: String },
    #[error("Invalid configuration: {err_msg}")]
    InvalidConfig { err_msg: String },
    #[error("Job {id} does not exist")]
    JobNotFound { id: usize },
    #[error("Job {id} is still running")]
    JobRunning { id: usize },
    #[error("Run into a timeout {elapsed}.")]
    Timeout { elapsed: Elapsed },
    #[error("{err}")]
    Codec { err: CodecError },
    #[error("{err}")]
    IoError { err: std::io::Error },
    #[error("{err}")]
    Serde { err: serde_json::Error },
}

impl FuzzError {
    /// Shorthand for `FuzzError::InvalidConfig`
    pub fn invalid_config(err_msg: impl Into<String>) -> Self {
        FuzzError::InvalidConfig {
            err_msg: err_msg.into(),
        }
    }
}

impl From<std::io::Error> for FuzzError {
    fn from(err: std::io::Error) -> Self {
        FuzzError::IoError { err }
    }
}

impl From<serde_json::Error> for FuzzError {
    fn from(err: serde_json::Error) -> Self {
        FuzzError::Serde { err }
    }
}

impl From<Elapsed> for FuzzError {
    fn from(elapsed: Elapsed) -> Self {
        FuzzError::Timeout { elapsed }
    }
}

impl From<CodecError> for FuzzError {
    fn from(err: CodecError) -> Self {
        FuzzError::Codec { err }
    }
}
