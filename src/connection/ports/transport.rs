//! Transport port: establishing wire sessions and exchanging frames.

use crate::connection::{
    domain::{AuthContext, RpcRequest, RpcResponse, SessionEvent, TransportKind},
    services::RequestCorrelator,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Parameters for establishing one session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRequest {
    /// Remote endpoint.
    pub endpoint: Url,
    /// Transport kind to establish.
    pub kind: TransportKind,
    /// Deadline for the handshake.
    pub timeout: Duration,
    /// Credentials to inject, if the service is auth-gated.
    pub auth: Option<AuthContext>,
}

impl ConnectRequest {
    /// Creates a request without credentials.
    #[must_use]
    pub const fn new(endpoint: Url, kind: TransportKind, timeout: Duration) -> Self {
        Self {
            endpoint,
            kind,
            timeout,
            auth: None,
        }
    }

    /// Attaches credentials.
    #[must_use]
    pub fn with_auth(mut self, auth: Option<AuthContext>) -> Self {
        self.auth = auth;
        self
    }
}

/// Establishes wire sessions for a given transport kind.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Opens a session.
    ///
    /// Implementations perform a best-effort liveness probe after the
    /// handshake; a failed probe is logged and never fails establishment.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unsupported`] when the endpoint signals it
    /// does not speak `request.kind`, or another [`TransportError`] when the
    /// handshake fails.
    async fn connect(&self, request: ConnectRequest) -> TransportResult<Arc<dyn TransportSession>>;
}

/// A live wire session backing exactly one connection.
///
/// Each session owns its [`RequestCorrelator`]; responses that arrive on an
/// inbound channel are routed through it, and closing the session rejects
/// every outstanding call.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Returns the negotiated transport kind.
    fn kind(&self) -> TransportKind;

    /// Returns the remote endpoint.
    fn endpoint(&self) -> &Url;

    /// Returns the session's pending-call correlator.
    fn correlator(&self) -> &RequestCorrelator;

    /// Transmits a request frame.
    ///
    /// Returns `Some` when the reply arrived synchronously on the same
    /// exchange (stateless bodies, sideband replies) and `None` when the
    /// reply will be routed through the correlator by an inbound reader.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the frame cannot be delivered.
    async fn send(&self, request: RpcRequest) -> TransportResult<Option<RpcResponse>>;

    /// Subscribes to notifications, errors and the close event.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Performs one liveness probe and returns its round-trip latency.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the probe fails; callers treat this
    /// as a health signal only.
    async fn probe(&self, timeout: Duration) -> TransportResult<Duration>;

    /// Closes the session, releasing background tasks and rejecting
    /// outstanding calls. Closing twice is a no-op.
    async fn close(&self);

    /// Returns whether the session has closed.
    fn is_closed(&self) -> bool;
}

/// Errors returned by transport adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint could not be reached.
    #[error("connection to {endpoint} failed: {reason}")]
    Connect {
        /// Endpoint that was dialled.
        endpoint: String,
        /// Failure description.
        reason: String,
    },

    /// The endpoint explicitly does not support the requested transport.
    #[error("transport {kind} is not supported by the endpoint: {reason}")]
    Unsupported {
        /// Requested transport.
        kind: TransportKind,
        /// Reason reported or inferred.
        reason: String,
    },

    /// The endpoint answered with a non-success HTTP status.
    #[error("endpoint returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        body: String,
    },

    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The session is live but cannot carry calls.
    #[error("tool execution is unavailable on this transport: {0}")]
    ExecutionUnavailable(String),

    /// The handshake did not complete in time.
    #[error("transport handshake timed out after {0:?}")]
    Timeout(Duration),

    /// The session is closed.
    #[error("transport closed: {0}")]
    Closed(String),
}

impl TransportError {
    /// Builds a [`TransportError::Connect`] from any displayable cause.
    pub fn connect(endpoint: &Url, reason: impl std::fmt::Display) -> Self {
        Self::Connect {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Builds a [`TransportError::Protocol`] from any displayable cause.
    pub fn protocol(reason: impl std::fmt::Display) -> Self {
        Self::Protocol(reason.to_string())
    }
}
