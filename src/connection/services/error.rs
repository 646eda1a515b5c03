//! Service-level error taxonomy shared by every gateway operation.

use super::CallError;
use crate::connection::{
    domain::{ConnectionDomainError, ConnectionId, ConnectionState, ServiceId, TransportKind},
    ports::{CredentialVerifierError, ServiceDiscoveryError, TransportError},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

/// Code attached to each failed fallback candidate.
pub const CANDIDATE_FAILED_CODE: &str = "TRANSPORT_CANDIDATE_FAILED";

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Broad failure category; callers must be able to tell these apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected locally before or without any remote exchange.
    Validation,
    /// The remote side reported a protocol-level failure.
    Remote,
    /// The network or transport failed.
    Transport,
    /// The gateway itself failed.
    Internal,
}

/// One failed transport candidate during fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    /// Transport that was attempted.
    pub kind: TransportKind,
    /// Why the attempt failed.
    pub error: TransportError,
}

impl CandidateFailure {
    /// Returns the structured form used in error details.
    #[must_use]
    pub fn to_details(&self) -> Value {
        json!({
            "code": CANDIDATE_FAILED_CODE,
            "transport": self.kind.as_str(),
            "reason": self.error.to_string(),
        })
    }
}

fn describe_failures(failures: &[CandidateFailure]) -> String {
    let mut described = String::new();
    for (index, failure) in failures.iter().enumerate() {
        if index > 0 {
            described.push_str("; ");
        }
        described.push_str(&format!("{}: {}", failure.kind, failure.error));
    }
    described
}

/// Errors returned by gateway services.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Input failed local validation.
    #[error(transparent)]
    Validation(#[from] ConnectionDomainError),

    /// The registry has no such service.
    #[error("service not found: {0}")]
    ServiceNotFound(ServiceId),

    /// The registry could not be queried.
    #[error("service registry unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// The service is auth-gated and no auth request was supplied.
    #[error("service {0} requires authentication")]
    AuthRequired(ServiceId),

    /// Credential verification failed.
    #[error("authentication failed ({code}): {message}")]
    AuthFailed {
        /// Verifier failure code.
        code: String,
        /// Human-readable reason.
        message: String,
    },

    /// Every transport candidate failed.
    #[error("no transport could connect to service {service_id}: {}", describe_failures(.failures))]
    ConnectionFailed {
        /// Service being connected.
        service_id: ServiceId,
        /// Every attempt with its reason, in the order tried.
        failures: Vec<CandidateFailure>,
    },

    /// No connection has this identifier.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// The connection exists but cannot accept calls.
    #[error("connection {connection_id} is not ready (state: {state})")]
    ConnectionNotReady {
        /// Connection identifier.
        connection_id: ConnectionId,
        /// Current state.
        state: ConnectionState,
    },

    /// The tool is not in the connection's discovered set.
    #[error("tool '{tool}' not found; available tools: [{}]", .available.join(", "))]
    ToolNotFound {
        /// Requested tool name.
        tool: String,
        /// Discovered tool names.
        available: Vec<String>,
    },

    /// The remote service reported a failure payload.
    #[error("remote tool error {code}: {message}")]
    RemoteTool {
        /// Remote error code.
        code: i64,
        /// Remote error message.
        message: String,
        /// Remote error data.
        data: Option<Value>,
    },

    /// A suspension point exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Configured deadline.
        after: Duration,
    },

    /// The session closed while the call was outstanding.
    #[error("disconnected while the call was in flight: {0}")]
    Disconnected(String),

    /// The transport failed outside of fallback.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An internal invariant failed (for example a poisoned lock).
    #[error("internal gateway error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Wraps an internal failure.
    pub fn internal(reason: impl std::fmt::Display) -> Self {
        Self::Internal(reason.to_string())
    }

    /// Returns the stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ServiceNotFound(_) => "SERVICE_NOT_FOUND",
            Self::DiscoveryUnavailable(_) => "DISCOVERY_UNAVAILABLE",
            Self::AuthRequired(_) => "AUTH_REQUIRED",
            Self::AuthFailed { .. } => "AUTH_FAILED",
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            Self::ConnectionNotReady { .. } => "CONNECTION_NOT_READY",
            Self::ToolNotFound { .. } => "TOOL_NOT_FOUND",
            Self::RemoteTool { .. } => "REMOTE_TOOL_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Disconnected(_) => "DISCONNECTED_MID_FLIGHT",
            Self::Transport(TransportError::ExecutionUnavailable(_)) => {
                "TRANSPORT_EXECUTION_UNAVAILABLE"
            }
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the failure category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_)
            | Self::ServiceNotFound(_)
            | Self::AuthRequired(_)
            | Self::ConnectionNotFound(_)
            | Self::ConnectionNotReady { .. }
            | Self::ToolNotFound { .. } => ErrorCategory::Validation,
            Self::AuthFailed { .. } | Self::RemoteTool { .. } => ErrorCategory::Remote,
            Self::DiscoveryUnavailable(_)
            | Self::ConnectionFailed { .. }
            | Self::Timeout { .. }
            | Self::Disconnected(_)
            | Self::Transport(_) => ErrorCategory::Transport,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns structured details, where useful.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::ConnectionFailed {
                service_id,
                failures,
            } => Some(json!({
                "service_id": service_id.as_str(),
                "attempts": failures.iter().map(CandidateFailure::to_details).collect::<Vec<_>>(),
            })),
            Self::ToolNotFound { tool, available } => Some(json!({
                "tool": tool,
                "available_tools": available,
            })),
            Self::RemoteTool { code, data, .. } => Some(json!({
                "remote_code": code,
                "data": data,
            })),
            Self::ConnectionNotReady { state, .. } => Some(json!({"state": state.as_str()})),
            Self::AuthFailed { code, .. } => Some(json!({"verifier_code": code})),
            Self::Timeout { operation, after } => Some(json!({
                "operation": operation,
                "timeout_ms": u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
            })),
            _ => None,
        }
    }

    /// Returns the serializable user-visible error body.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
            category: self.category(),
            details: self.details(),
        }
    }
}

impl From<ServiceDiscoveryError> for GatewayError {
    fn from(err: ServiceDiscoveryError) -> Self {
        match err {
            ServiceDiscoveryError::NotFound(service_id) => Self::ServiceNotFound(service_id),
            ServiceDiscoveryError::Upstream(cause) => Self::DiscoveryUnavailable(cause.to_string()),
        }
    }
}

impl From<CredentialVerifierError> for GatewayError {
    fn from(err: CredentialVerifierError) -> Self {
        Self::AuthFailed {
            code: err.code().to_owned(),
            message: err.to_string(),
        }
    }
}

impl From<CallError> for GatewayError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Remote(remote) => Self::RemoteTool {
                code: remote.code,
                message: remote.message,
                data: remote.data,
            },
            CallError::Timeout(after) => Self::Timeout {
                operation: "tool call",
                after,
            },
            CallError::Disconnected(reason) => Self::Disconnected(reason),
            CallError::Transport(transport) => Self::Transport(transport),
        }
    }
}

/// User-visible error shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Failure category.
    pub category: ErrorCategory,
    /// Structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
