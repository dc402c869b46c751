//! Error model shared by the engine, the remote service seam and callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::JobId;

/// Errors raised while constructing model values (ids, requests).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A value failed validation (e.g. an empty query).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

/// Machine-readable error code carried by every [`PollingError`].
///
/// Codes minted locally have dedicated variants; anything else the remote
/// service reports is passed through verbatim as [`ErrorCode::Remote`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    Cancelled,
    PollingTimeout,
    Network,
    ApiError,
    InvalidRequest,
    Internal,
    Remote(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::PollingTimeout => "POLLING_TIMEOUT",
            ErrorCode::Network => "NETWORK",
            ErrorCode::ApiError => "API_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Internal => "INTERNAL_ERROR",
            ErrorCode::Remote(code) => code,
        }
    }
}

impl From<String> for ErrorCode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "CANCELLED" => ErrorCode::Cancelled,
            "POLLING_TIMEOUT" => ErrorCode::PollingTimeout,
            "NETWORK" => ErrorCode::Network,
            "API_ERROR" => ErrorCode::ApiError,
            "INVALID_REQUEST" => ErrorCode::InvalidRequest,
            "INTERNAL_ERROR" => ErrorCode::Internal,
            _ => ErrorCode::Remote(value),
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(value: &str) -> Self {
        ErrorCode::from(value.to_string())
    }
}

impl From<ErrorCode> for String {
    fn from(value: ErrorCode) -> Self {
        value.as_str().to_string()
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail as reported by the remote service on a `failed` job or a
/// non-2xx response. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

/// The single typed error a polling session surfaces to its caller.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("[{code}] {message}")]
#[serde(rename_all = "camelCase")]
pub struct PollingError {
    pub message: String,
    pub code: ErrorCode,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time_ms: Option<u64>,
    /// The remote job this error relates to, once one has been assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
}

impl PollingError {
    pub fn new(code: ErrorCode, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            code,
            retryable,
            elapsed_time_ms: None,
            job_id: None,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Research job was cancelled", false)
    }

    pub fn timeout(elapsed_time_ms: u64) -> Self {
        Self::new(
            ErrorCode::PollingTimeout,
            format!("Research job timed out after {elapsed_time_ms}ms"),
            false,
        )
        .with_elapsed(elapsed_time_ms)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message, true)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiError, message, false)
    }

    /// Build from remote-supplied detail, filling gaps with the given defaults.
    pub fn from_remote(
        remote: &RemoteError,
        default_message: &str,
        default_retryable: bool,
    ) -> Self {
        let code = remote
            .code
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(ErrorCode::from)
            .unwrap_or(ErrorCode::ApiError);
        let message = remote
            .message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(default_message);
        Self::new(code, message, remote.retryable.unwrap_or(default_retryable))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message, false)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message, false)
    }

    pub fn with_elapsed(mut self, elapsed_time_ms: u64) -> Self {
        self.elapsed_time_ms = Some(elapsed_time_ms);
        self
    }

    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }
}

/// Outcome classification of a single call to the remote job service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Structured error reported by the service itself.
    #[error("remote service error: {0}")]
    Api(PollingError),

    /// Connectivity failure (DNS, refused connection, request timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered but the body could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Structured errors are authoritative unless the service itself labels
    /// them `NETWORK`.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Api(err) => err.code == ErrorCode::Network,
            ServiceError::Transport(_) | ServiceError::Malformed(_) => true,
        }
    }
}

/// Structured errors pass through unchanged; anything else becomes `NETWORK`.
impl From<ServiceError> for PollingError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Api(err) => err,
            other => PollingError::network(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Malformed(err.to_string())
    }
}
