use thiserror::Error;

pub type CapiResult<T> = Result<T, CapiError>;

#[derive(Error, Debug)]
pub enum CapiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Dataset quality error: {0}")]
    Quality(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Failure of a single outbound vendor request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The vendor answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never completed.
    #[error("network failure: {0}")]
    Network(String),

    /// 2xx response whose body was not JSON.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request was refused before it left the process.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// HTTP status code, when the vendor produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
