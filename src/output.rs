//! JSON printed on stdout by every `ceylon-offline` command
//!
//! Successful commands report which origin and worker version they ran
//! against; failures carry only the error code and message, so scripts can
//! branch on `ok` and `error.code`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const ENVELOPE_VERSION: &str = "v1";

/// Result of one CLI invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputEnvelope {
    pub ok: bool,

    /// What `data` holds: install_result, activation, fetch_result,
    /// store_status, kv_result, preferences, push_result or preload_result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Site the worker was configured for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Store generation the command ran with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_version: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,

    pub meta: Metadata,
}

/// Failure details; `code` is one of the `CliError` codes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub version: String,

    /// Wall time of the command, omitted for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Metadata {
    fn new(duration_ms: Option<u64>) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            duration_ms,
        }
    }
}

impl OutputEnvelope {
    pub fn success(
        kind: &str,
        origin: &str,
        worker_version: u32,
        data: Value,
        duration_ms: Option<u64>,
    ) -> Self {
        Self {
            ok: true,
            kind: Some(kind.to_string()),
            origin: Some(origin.to_string()),
            worker_version: Some(worker_version),
            data: Some(data),
            error: None,
            meta: Metadata::new(duration_ms),
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            ok: false,
            kind: None,
            origin: None,
            worker_version: None,
            data: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: message.to_string(),
            }),
            meta: Metadata::new(None),
        }
    }

    /// Pretty-printed for terminals; still one JSON document per run
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
