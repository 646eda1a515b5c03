//! Error types for connection domain validation and parsing.

use super::ConnectionId;
use thiserror::Error;

/// Errors returned while constructing connection domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionDomainError {
    /// The service identifier is empty after trimming.
    #[error("service id must not be empty")]
    EmptyServiceId,

    /// The service identifier exceeds the storage limit.
    #[error("service id exceeds 200 character limit: {0}")]
    ServiceIdTooLong(String),

    /// The owner tag is empty after trimming.
    #[error("owner tag must not be empty")]
    EmptyOwnerTag,

    /// The service endpoint is empty.
    #[error("service endpoint must not be empty")]
    EmptyEndpoint,

    /// The service endpoint is not an absolute URL with a supported scheme.
    #[error("service endpoint '{0}' must be an http(s) or ws(s) URL")]
    InvalidEndpoint(String),

    /// A tool name is empty after trimming.
    #[error("tool name must not be empty")]
    EmptyToolName,

    /// A tool call parameter payload is not a JSON object.
    #[error("tool parameters must be a JSON object")]
    InvalidToolParameters,

    /// An auth request field is empty.
    #[error("auth request field '{0}' must not be empty")]
    EmptyAuthField(&'static str),

    /// A configured duration is zero.
    #[error("configuration value '{0}' must be greater than zero")]
    ZeroDuration(&'static str),

    /// Transitioning between two lifecycle states is invalid.
    #[error("invalid connection state transition for {connection_id}: {from} -> {to}")]
    InvalidStateTransition {
        /// Connection identifier.
        connection_id: ConnectionId,
        /// Current lifecycle state.
        from: String,
        /// Requested target lifecycle state.
        to: String,
    },
}

/// Error returned while parsing a transport kind from configuration or
/// registry metadata.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown transport kind: {0}")]
pub struct ParseTransportKindError(pub String);
