//! Worker error types

use crate::lifecycle::Phase;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkerError>;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Invalid lifecycle transition: cannot {action} while {phase}")]
    InvalidPhase { action: &'static str, phase: Phase },

    #[error("Network error: {0}")]
    Network(#[from] crate::network::FetchError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl WorkerError {
    /// Machine-readable code used in the CLI error envelope
    pub fn code(&self) -> &'static str {
        match self {
            WorkerError::InstallFailed(_) => "INSTALL_FAILED",
            WorkerError::InvalidPhase { .. } => "INVALID_PHASE",
            WorkerError::Network(_) => "NETWORK_ERROR",
            WorkerError::InvalidRequest(_) => "INVALID_REQUEST",
            WorkerError::Storage(_) => "STORAGE_ERROR",
            WorkerError::Json(_) => "JSON_ERROR",
            WorkerError::Io(_) => "IO_ERROR",
            WorkerError::Generic(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_phase_display() {
        let err = WorkerError::InvalidPhase {
            action: "activate",
            phase: Phase::Parsed,
        };
        assert_eq!(
            err.to_string(),
            "Invalid lifecycle transition: cannot activate while parsed"
        );
        assert_eq!(err.code(), "INVALID_PHASE");
    }

    #[test]
    fn test_network_error_conversion() {
        let err: WorkerError = crate::network::FetchError::Transport("connection refused".into()).into();
        assert!(matches!(err, WorkerError::Network(_)));
        assert!(err.to_string().contains("connection refused"));
    }
}
