//! CLI orchestration module
//!
//! Error mapping, flag handling and result views used by the binary. Kept
//! here so they can be tested without spawning the executable.

use crate::config::{ConfigOptions, WorkerConfig};
use crate::error::WorkerError;
use crate::http::{Request, Response};
use crate::interceptor::{Intercept, ResponseSource};
use crate::kv::StorageError;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use url::Url;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("{0}")]
    InvalidPhase(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl CliError {
    /// Machine-readable code for the error envelope
    pub fn code(&self) -> &'static str {
        match self {
            CliError::InvalidArguments(_) => "INVALID_ARGUMENT",
            CliError::InstallFailed(_) => "INSTALL_FAILED",
            CliError::InvalidPhase(_) => "INVALID_PHASE",
            CliError::NetworkError(_) => "NETWORK_ERROR",
            CliError::StorageError(_) => "STORAGE_ERROR",
            CliError::IoError(_) => "IO_ERROR",
            CliError::ExecutionFailed(_) => "EXECUTION_FAILED",
        }
    }
}

impl From<WorkerError> for CliError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::InstallFailed(msg) => CliError::InstallFailed(msg),
            e @ WorkerError::InvalidPhase { .. } => CliError::InvalidPhase(e.to_string()),
            WorkerError::Network(e) => CliError::NetworkError(e.to_string()),
            WorkerError::InvalidRequest(msg) => CliError::InvalidArguments(msg),
            WorkerError::Storage(msg) => CliError::StorageError(msg),
            WorkerError::Io(e) => CliError::IoError(e.to_string()),
            e @ WorkerError::Json(_) => CliError::ExecutionFailed(e.to_string()),
            WorkerError::Generic(e) => e.into(),
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<WorkerError>() {
            Ok(worker_err) => worker_err.into(),
            Err(err) if err.downcast_ref::<StorageError>().is_some() => {
                CliError::StorageError(format!("{:#}", err))
            }
            Err(err) if err.downcast_ref::<std::io::Error>().is_some() => {
                CliError::IoError(format!("{:#}", err))
            }
            Err(err) => CliError::ExecutionFailed(format!("{:#}", err)),
        }
    }
}

/// Worker configuration helper
pub struct ConfigBuilder;

impl ConfigBuilder {
    /// Build worker config from CLI flags layered over the config file
    pub fn from_cli_flags(
        origin: Option<Url>,
        version: Option<u32>,
        data_dir: Option<PathBuf>,
    ) -> WorkerConfig {
        let mut options = ConfigOptions::new();
        if let Some(origin) = origin {
            options = options.with_origin(origin);
        }
        if let Some(version) = version {
            options = options.with_version(version);
        }
        if let Some(data_dir) = data_dir {
            options = options.with_data_dir(data_dir);
        }
        WorkerConfig::from_options(options)
    }
}

/// Parser for values given on the command line
pub struct ValueParser;

impl ValueParser {
    /// Interpret `raw` as JSON when it parses, otherwise as a plain string
    pub fn parse_value(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    }

    /// Parse a JSON object argument
    pub fn parse_object(raw: &str) -> CliResult<Value> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| CliError::InvalidArguments(format!("Invalid JSON payload: {}", e)))?;
        if !value.is_object() {
            return Err(CliError::InvalidArguments(
                "JSON payload must be an object".to_string(),
            ));
        }
        Ok(value)
    }
}

/// How a fetch was answered, for display
#[derive(Debug, Serialize, Clone)]
pub struct FetchView {
    pub method: String,
    pub url: String,
    pub intercepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ResponseSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

impl FetchView {
    /// Fill in what the response looked like
    pub fn with_response(mut self, response: &Response) -> Self {
        self.status = Some(response.status);
        self.content_type = response.header("content-type").map(str::to_string);
        self.size = Some(response.body.len());
        self
    }
}

/// Convert an interception outcome to a FetchView
pub fn to_fetch_view(request: &Request, outcome: &Intercept) -> FetchView {
    let mut view = FetchView {
        method: request.method.clone(),
        url: request.url.to_string(),
        intercepted: false,
        store: None,
        strategy: None,
        source: None,
        status: None,
        content_type: None,
        size: None,
    };

    match outcome.resolved() {
        Some(resolved) => {
            view.intercepted = true;
            view.store = Some(resolved.policy.store.to_string());
            view.strategy = Some(resolved.policy.strategy.to_string());
            view.source = Some(resolved.source);
            view.with_response(&resolved.response)
        }
        None => view,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::IMAGE_POLICY;
    use crate::http::Destination;
    use crate::interceptor::Resolved;
    use crate::lifecycle::Phase;
    use crate::network::FetchError;
    use anyhow::anyhow;

    #[test]
    fn test_cli_error_from_anyhow() {
        let err = anyhow!("test error");
        let cli_err: CliError = err.into();
        assert!(matches!(cli_err, CliError::ExecutionFailed(_)));
        assert_eq!(cli_err.code(), "EXECUTION_FAILED");
    }

    #[test]
    fn test_cli_error_from_worker_install_failed() {
        let err = anyhow::Error::from(WorkerError::InstallFailed("404".to_string()));
        let cli_err: CliError = err.into();
        assert!(matches!(cli_err, CliError::InstallFailed(_)));
        assert_eq!(cli_err.code(), "INSTALL_FAILED");
    }

    #[test]
    fn test_cli_error_from_worker_phase_and_network() {
        let phase: CliError = WorkerError::InvalidPhase {
            action: "activate",
            phase: Phase::Parsed,
        }
        .into();
        assert_eq!(phase.code(), "INVALID_PHASE");
        assert!(phase.to_string().contains("cannot activate while parsed"));

        let network: CliError = WorkerError::from(FetchError::Transport("refused".into())).into();
        assert_eq!(network.code(), "NETWORK_ERROR");
    }

    #[test]
    fn test_cli_error_from_storage_error() {
        let err = anyhow::Error::from(StorageError::QuotaExceeded {
            needed: 10,
            quota: 5,
        });
        let cli_err: CliError = err.into();
        assert_eq!(cli_err.code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(ValueParser::parse_value("42"), serde_json::json!(42));
        assert_eq!(
            ValueParser::parse_value(r#"{"a": [1, 2]}"#),
            serde_json::json!({"a": [1, 2]})
        );
        assert_eq!(ValueParser::parse_value("sapphire"), serde_json::json!("sapphire"));
    }

    #[test]
    fn test_parse_object() {
        assert!(ValueParser::parse_object(r#"{"sort": "newest"}"#).is_ok());
        assert!(ValueParser::parse_object(r#"["not", "object"]"#).is_err());
        assert!(ValueParser::parse_object("{invalid json}").is_err());
    }

    #[test]
    fn test_fetch_view_bypass() {
        let request = Request::parse("https://cdn.example.com/lib.js").unwrap();
        let view = to_fetch_view(&request, &Intercept::Bypass);
        assert!(!view.intercepted);
        assert!(view.status.is_none());

        let view = view.with_response(&Response::opaque());
        assert_eq!(view.status, Some(0));
        assert!(view.store.is_none());
    }

    #[test]
    fn test_fetch_view_resolved() {
        let request = Request::parse("http://localhost:5173/img/ruby.jpg")
            .unwrap()
            .with_destination(Destination::Image);
        let outcome = Intercept::Respond(Resolved {
            response: Response::new(200, b"jpeg".to_vec()).with_header("Content-Type", "image/jpeg"),
            source: ResponseSource::Cache,
            policy: IMAGE_POLICY,
        });

        let view = to_fetch_view(&request, &outcome);
        assert!(view.intercepted);
        assert_eq!(view.store.as_deref(), Some("images"));
        assert_eq!(view.strategy.as_deref(), Some("cache-first"));
        assert_eq!(view.source, Some(ResponseSource::Cache));
        assert_eq!(view.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(view.size, Some(4));
    }
}
