//! Error types for the record/replay proxy.
//!
//! `ConfigError` is startup-fatal. Everything else is raised per request and
//! converted into a JSON response by the mode controller; the process never
//! terminates because of a single request.

use crate::proxy::ApiTarget;
use hyper::StatusCode;
use std::path::PathBuf;

/// Misconfiguration detected while building the proxy.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid proxy mode '{0}'. Expected one of: record, force-record, replay, passthrough")]
    InvalidMode(String),
    #[error("Invalid upstream URL for target '{target}': {reason}")]
    InvalidUpstream { target: ApiTarget, reason: String },
    #[error("Path prefixes '{first}' and '{second}' overlap")]
    OverlappingPrefixes { first: String, second: String },
    #[error("Path prefix for target '{0}' must not be empty")]
    EmptyPrefix(ApiTarget),
    #[error("Recordings directory must not be empty")]
    EmptyRecordingsDir,
}

/// Failure while persisting a recording.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to write recording {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize recording: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Network-level failure talking to an upstream.
///
/// A 4xx/5xx answer from the upstream is not a `ForwardError`.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Upstream '{target}' unreachable: {message}")]
    Unreachable { target: ApiTarget, message: String },
    #[error("Upstream '{target}' did not respond within {after_ms}ms")]
    Timeout { target: ApiTarget, after_ms: u64 },
    #[error("Invalid upstream URI for '{target}': {uri}")]
    InvalidUri { target: ApiTarget, uri: String },
}

impl ForwardError {
    pub fn target(&self) -> ApiTarget {
        match self {
            ForwardError::Unreachable { target, .. }
            | ForwardError::Timeout { target, .. }
            | ForwardError::InvalidUri { target, .. } => *target,
        }
    }
}

/// Per-request failure surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No recording for {method} {endpoint}")]
    RecordingNotFound {
        target: ApiTarget,
        method: String,
        endpoint: String,
    },
    #[error(transparent)]
    Upstream(#[from] ForwardError),
    #[error("{source}")]
    StoreWrite {
        target: ApiTarget,
        #[source]
        source: StoreError,
    },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RecordingNotFound { .. } => StatusCode::NOT_FOUND,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::StoreWrite { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn target(&self) -> ApiTarget {
        match self {
            ProxyError::RecordingNotFound { target, .. } => *target,
            ProxyError::Upstream(e) => e.target(),
            ProxyError::StoreWrite { target, .. } => *target,
        }
    }

    /// JSON body for the error response. Request headers are never echoed.
    pub fn to_body(&self) -> serde_json::Value {
        match self {
            ProxyError::RecordingNotFound { target, .. } => serde_json::json!({
                "error": "Recording not found",
                "message": self.to_string(),
                "target": target.as_str(),
                "hint": "Run with PROXY_MODE=record to record this endpoint",
            }),
            ProxyError::Upstream(e) => serde_json::json!({
                "error": "Proxy error",
                "message": e.to_string(),
                "target": e.target().as_str(),
            }),
            ProxyError::StoreWrite { target, source } => serde_json::json!({
                "error": "Recording write failed",
                "message": source.to_string(),
                "target": target.as_str(),
            }),
        }
    }
}
