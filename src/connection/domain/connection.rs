//! Connection aggregate root.

use super::{
    AuthContext, ConnectionDomainError, ConnectionHealth, ConnectionId, ConnectionState,
    DiscoveryStatus, OwnerTag, ServiceDescriptor, ServiceId, ToolSet, TransportKind,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// A gateway connection to one remote tool service.
///
/// The aggregate records lifecycle state and metadata only; the live wire
/// session is owned by the connection registry alongside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connection {
    id: ConnectionId,
    service_id: ServiceId,
    owner: Option<OwnerTag>,
    state: ConnectionState,
    failure_reason: Option<String>,
    transport: Option<TransportKind>,
    endpoint: Url,
    #[serde(skip)]
    auth: Option<AuthContext>,
    tools: ToolSet,
    discovery: Option<DiscoveryStatus>,
    health: ConnectionHealth,
    created_at: DateTime<Utc>,
    last_used_at: DateTime<Utc>,
}

impl Connection {
    /// Creates a connection in the `INITIALIZING` state.
    #[must_use]
    pub fn new(
        descriptor: &ServiceDescriptor,
        owner: Option<OwnerTag>,
        clock: &impl Clock,
    ) -> Self {
        let timestamp = clock.utc();
        Self {
            id: ConnectionId::new(),
            service_id: descriptor.id().clone(),
            owner,
            state: ConnectionState::Initializing,
            failure_reason: None,
            transport: None,
            endpoint: descriptor.endpoint().clone(),
            auth: None,
            tools: ToolSet::new(),
            discovery: None,
            health: ConnectionHealth::new(),
            created_at: timestamp,
            last_used_at: timestamp,
        }
    }

    /// Returns the connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the service identifier.
    #[must_use]
    pub const fn service_id(&self) -> &ServiceId {
        &self.service_id
    }

    /// Returns the owner tag, if any.
    #[must_use]
    pub const fn owner(&self) -> Option<&OwnerTag> {
        self.owner.as_ref()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns the failure or disconnect reason, if any.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns the negotiated transport kind.
    #[must_use]
    pub const fn transport(&self) -> Option<TransportKind> {
        self.transport
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the auth context owned by this connection.
    #[must_use]
    pub const fn auth(&self) -> Option<&AuthContext> {
        self.auth.as_ref()
    }

    /// Returns the discovered tools.
    #[must_use]
    pub const fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Returns how the tool set was obtained, once discovery has run.
    #[must_use]
    pub const fn discovery(&self) -> Option<&DiscoveryStatus> {
        self.discovery.as_ref()
    }

    /// Returns whether live discovery failed.
    #[must_use]
    pub fn is_discovery_degraded(&self) -> bool {
        self.discovery
            .as_ref()
            .is_some_and(DiscoveryStatus::is_degraded)
    }

    /// Returns the health metrics.
    #[must_use]
    pub const fn health(&self) -> &ConnectionHealth {
        &self.health
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last successful tool call timestamp.
    #[must_use]
    pub const fn last_used_at(&self) -> DateTime<Utc> {
        self.last_used_at
    }

    /// Returns whether the connection has been idle for longer than
    /// `idle_timeout` at `now`.
    #[must_use]
    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        chrono::Duration::from_std(idle_timeout)
            .is_ok_and(|limit| now.signed_duration_since(self.last_used_at) > limit)
    }

    /// Enters `AUTHENTICATING`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionDomainError::InvalidStateTransition`] when the
    /// transition is not allowed.
    pub fn mark_authenticating(&mut self) -> Result<(), ConnectionDomainError> {
        self.transition_to(ConnectionState::Authenticating)
    }

    /// Stores the verified auth context.
    pub fn attach_auth(&mut self, auth: AuthContext) {
        self.auth = Some(auth);
    }

    /// Enters `CONNECTING`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionDomainError::InvalidStateTransition`] when the
    /// transition is not allowed.
    pub fn mark_connecting(&mut self) -> Result<(), ConnectionDomainError> {
        self.transition_to(ConnectionState::Connecting)
    }

    /// Enters `DISCOVERING` over the negotiated transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionDomainError::InvalidStateTransition`] when the
    /// transition is not allowed.
    pub fn mark_discovering(
        &mut self,
        transport: TransportKind,
    ) -> Result<(), ConnectionDomainError> {
        self.transition_to(ConnectionState::Discovering)?;
        self.transport = Some(transport);
        Ok(())
    }

    /// Enters `CONNECTED` with the discovered tools.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionDomainError::InvalidStateTransition`] when the
    /// transition is not allowed.
    pub fn mark_connected(
        &mut self,
        tools: ToolSet,
        discovery: DiscoveryStatus,
        clock: &impl Clock,
    ) -> Result<(), ConnectionDomainError> {
        self.transition_to(ConnectionState::Connected)?;
        self.tools = tools;
        self.discovery = Some(discovery);
        self.failure_reason = None;
        self.last_used_at = clock.utc();
        Ok(())
    }

    /// Enters `FAILED` with a reason.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionDomainError::InvalidStateTransition`] when the
    /// transition is not allowed.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), ConnectionDomainError> {
        self.transition_to(ConnectionState::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Enters `DISCONNECTED` after a transport-reported close.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionDomainError::InvalidStateTransition`] when the
    /// transition is not allowed.
    pub fn mark_disconnected(
        &mut self,
        reason: impl Into<String>,
    ) -> Result<(), ConnectionDomainError> {
        self.transition_to(ConnectionState::Disconnected)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Restarts establishment from `CONNECTED` or `DISCONNECTED`.
    ///
    /// This is the only backwards edge of the state machine.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionDomainError::InvalidStateTransition`] when the
    /// connection is not in a reconnectable state.
    pub fn begin_reconnect(&mut self) -> Result<(), ConnectionDomainError> {
        if !self.state.can_reconnect() {
            return Err(self.invalid_transition(ConnectionState::Connecting));
        }
        self.state = ConnectionState::Connecting;
        self.transport = None;
        self.failure_reason = None;
        Ok(())
    }

    /// Replaces the tool set, keeping the discovery status.
    pub fn replace_tools(&mut self, tools: ToolSet) {
        self.tools = tools;
    }

    /// Refreshes the last-used timestamp.
    pub fn touch(&mut self, clock: &impl Clock) {
        self.last_used_at = clock.utc();
    }

    /// Returns mutable health metrics for probe recording.
    pub const fn health_mut(&mut self) -> &mut ConnectionHealth {
        &mut self.health
    }

    fn invalid_transition(&self, target: ConnectionState) -> ConnectionDomainError {
        ConnectionDomainError::InvalidStateTransition {
            connection_id: self.id,
            from: self.state.as_str().to_owned(),
            to: target.as_str().to_owned(),
        }
    }

    fn transition_to(&mut self, target: ConnectionState) -> Result<(), ConnectionDomainError> {
        if !self.state.can_transition_to(target) {
            return Err(self.invalid_transition(target));
        }
        self.state = target;
        Ok(())
    }
}
