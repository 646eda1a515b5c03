//! Connection lifecycle orchestration.
//!
//! Sequences credential verification, transport fallback, capability
//! discovery and registration, and owns teardown of every session it
//! creates.

use super::{
    AttachedSession, BackgroundTask, ConnectionRegistry, FallbackSelector, GatewayError,
    GatewayResult, RegistryEntry, dispatch, health,
};
use crate::config::GatewayConfig;
use crate::connection::{
    domain::{
        AuthContext, AuthRequest, Connection, ConnectionDomainError, ConnectionId, DiscoveryStatus,
        OwnerTag, ServiceDescriptor, ServiceId, SessionEvent, TOOLS_LIST_METHOD, ToolDefinition,
        ToolSet, TransportKind,
    },
    ports::{
        CredentialVerifier, KnownSchemaRegistry, ServiceDiscovery, TransportConnector,
        TransportSession,
    },
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::{Value, json};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Request payload for creating a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateConnectionRequest {
    /// Descriptor of the service to connect to.
    pub descriptor: ServiceDescriptor,
    /// Credentials for auth-gated services.
    pub auth: Option<AuthRequest>,
    /// Opaque tenant tag used to scope listings.
    pub owner: Option<OwnerTag>,
    /// Transport to use instead of fallback ordering.
    pub transport: Option<TransportKind>,
    /// Per-candidate handshake deadline overriding the configured one.
    pub timeout: Option<Duration>,
}

impl CreateConnectionRequest {
    /// Creates a request for `descriptor` with no credentials.
    #[must_use]
    pub const fn new(descriptor: ServiceDescriptor) -> Self {
        Self {
            descriptor,
            auth: None,
            owner: None,
            transport: None,
            timeout: None,
        }
    }

    /// Supplies credentials.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthRequest) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Tags the connection with an owner.
    #[must_use]
    pub fn with_owner(mut self, owner: OwnerTag) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Pins the transport kind.
    #[must_use]
    pub const fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the per-candidate handshake deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Connection lifecycle orchestration service.
pub struct ConnectionLifecycleService<T, V, C>
where
    T: TransportConnector,
    V: CredentialVerifier,
    C: Clock + Send + Sync + 'static,
{
    registry: Arc<ConnectionRegistry>,
    selector: FallbackSelector<T>,
    verifier: Arc<V>,
    clock: Arc<C>,
    config: GatewayConfig,
    discovery: Option<Arc<dyn ServiceDiscovery>>,
    known_schemas: Option<Arc<dyn KnownSchemaRegistry>>,
}

impl<T, V, C> ConnectionLifecycleService<T, V, C>
where
    T: TransportConnector,
    V: CredentialVerifier,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a lifecycle service writing into `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] when any configured deadline or
    /// interval is zero.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        connector: Arc<T>,
        verifier: Arc<V>,
        clock: Arc<C>,
        config: GatewayConfig,
    ) -> GatewayResult<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            selector: FallbackSelector::new(connector, config.connect_timeout),
            verifier,
            clock,
            config,
            discovery: None,
            known_schemas: None,
        })
    }

    /// Enables [`Self::connect_service`] through `discovery`.
    #[must_use]
    pub fn with_discovery(mut self, discovery: Arc<dyn ServiceDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Consults `known_schemas` when live discovery fails.
    #[must_use]
    pub fn with_known_schemas(mut self, known_schemas: Arc<dyn KnownSchemaRegistry>) -> Self {
        self.known_schemas = Some(known_schemas);
        self
    }

    /// Returns the shared registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Creates, authenticates, establishes and registers a connection.
    ///
    /// Auth-gated services without credentials are rejected before any
    /// network call. Discovery failures degrade the tool set instead of
    /// failing the connection.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AuthRequired`], [`GatewayError::AuthFailed`],
    /// [`GatewayError::Timeout`] for a slow verifier, or
    /// [`GatewayError::ConnectionFailed`] listing every transport attempt.
    pub async fn create_connection(
        &self,
        request: CreateConnectionRequest,
    ) -> GatewayResult<Connection> {
        let CreateConnectionRequest {
            descriptor,
            auth,
            owner,
            transport,
            timeout,
        } = request;

        if descriptor.requires_auth() && auth.is_none() {
            warn!(
                service_id = %descriptor.id(),
                "rejecting auth-gated service without credentials"
            );
            return Err(GatewayError::AuthRequired(descriptor.id().clone()));
        }

        let mut connection = Connection::new(&descriptor, owner, &*self.clock);
        info!(
            connection_id = %connection.id(),
            service_id = %descriptor.id(),
            "creating connection"
        );

        if let Some(auth_request) = auth.filter(|_| descriptor.requires_auth()) {
            connection.mark_authenticating()?;
            match self.authenticate(&auth_request).await {
                Ok(context) => connection.attach_auth(context),
                Err(err) => return Err(fail(&mut connection, err)),
            }
        }

        connection.mark_connecting()?;
        let session = match self
            .selector
            .establish(&descriptor, transport, connection.auth(), timeout)
            .await
        {
            Ok(session) => session,
            Err(err) => return Err(fail(&mut connection, err)),
        };

        if let Err(err) = self
            .discover_into(&mut connection, &descriptor, &*session)
            .await
        {
            session.close().await;
            return Err(fail(&mut connection, err));
        }

        let id = connection.id();
        let entry = RegistryEntry {
            connection: connection.clone(),
            descriptor,
            requested_transport: transport,
            attached: None,
        };
        let registered = self.registry.insert(entry).and_then(|()| {
            self.registry
                .replace_session(id, Some(self.attach(id, Arc::clone(&session))))
        });
        if let Err(err) = registered {
            session.close().await;
            return Err(err);
        }

        info!(
            connection_id = %id,
            service_id = %connection.service_id(),
            transport = %session.kind(),
            tools = connection.tools().len(),
            degraded = connection.is_discovery_degraded(),
            "connection established"
        );
        Ok(connection)
    }

    /// Resolves `service_id` through service discovery and connects to it.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ServiceNotFound`] or
    /// [`GatewayError::DiscoveryUnavailable`] from discovery, plus every
    /// error of [`Self::create_connection`].
    pub async fn connect_service(
        &self,
        service_id: &str,
        auth: Option<AuthRequest>,
        owner: Option<OwnerTag>,
    ) -> GatewayResult<Connection> {
        let discovery = self.discovery.as_ref().ok_or_else(|| {
            GatewayError::DiscoveryUnavailable("no service discovery configured".to_owned())
        })?;
        let id = ServiceId::new(service_id)?;
        let descriptor = discovery.get_service(&id).await?;

        self.create_connection(CreateConnectionRequest {
            auth,
            owner,
            ..CreateConnectionRequest::new(descriptor)
        })
        .await
    }

    /// Closes a connection and removes it from the registry.
    ///
    /// Stops the health monitor and rejects every in-flight call. Closing an
    /// unknown or already-closed id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] only when the registry is unusable.
    pub async fn close_connection(&self, id: ConnectionId) -> GatewayResult<()> {
        let Some(entry) = self.registry.remove(id)? else {
            debug!(connection_id = %id, "close requested for unknown connection");
            return Ok(());
        };
        if let Some(attached) = entry.attached {
            attached.shut_down().await;
        }
        info!(
            connection_id = %id,
            service_id = %entry.connection.service_id(),
            "connection closed"
        );
        Ok(())
    }

    /// Returns a snapshot of a connection.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConnectionNotFound`] for unknown ids.
    pub fn get_connection(&self, id: ConnectionId) -> GatewayResult<Connection> {
        self.registry
            .get(id)?
            .ok_or(GatewayError::ConnectionNotFound(id))
    }

    /// Lists connections that are not `DISCONNECTED`, optionally scoped to
    /// an owner tag.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] only when the registry is unusable.
    pub fn list_connections(&self, owner: Option<&OwnerTag>) -> GatewayResult<Vec<Connection>> {
        self.registry.list(owner)
    }

    /// Re-runs transport acquisition and discovery for a `CONNECTED` or
    /// `DISCONNECTED` connection, replacing its session.
    ///
    /// A connection that cannot be re-established is removed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConnectionNotFound`] for unknown ids,
    /// [`GatewayError::Validation`] when the state does not allow a
    /// reconnect, or the establishment errors of [`Self::create_connection`].
    pub async fn reconnect(&self, id: ConnectionId) -> GatewayResult<Connection> {
        let (descriptor, requested) = self.registry.origin(id)?;
        let auth = self.begin_reconnect(id)?;

        if let Some(previous) = self.registry.replace_session(id, None)? {
            previous.shut_down().await;
        }
        info!(connection_id = %id, service_id = %descriptor.id(), "reconnecting");

        let session = match self
            .selector
            .establish(&descriptor, requested, auth.as_ref(), None)
            .await
        {
            Ok(session) => session,
            Err(err) => return Err(self.discard(id, err)),
        };

        if let Err(err) = self.rediscover(id, &descriptor, &*session).await {
            session.close().await;
            return Err(self.discard(id, err));
        }

        let attached = self.attach(id, Arc::clone(&session));
        if let Err(err) = self.registry.replace_session(id, Some(attached)) {
            session.close().await;
            return Err(err);
        }
        self.get_connection(id)
    }

    /// Closes connections unused for longer than the idle timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] only when the registry is unusable.
    pub async fn evict_idle(&self, now: DateTime<Utc>) -> GatewayResult<Vec<ConnectionId>> {
        let idle = self.registry.idle_ids(now, self.config.idle_timeout)?;
        for id in &idle {
            info!(connection_id = %id, "evicting idle connection");
            self.close_connection(*id).await?;
        }
        Ok(idle)
    }

    /// Closes every connection. Returns how many were closed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] only when the registry is unusable.
    pub async fn shutdown(&self) -> GatewayResult<usize> {
        let entries = self.registry.drain()?;
        let count = entries.len();
        for entry in entries {
            if let Some(attached) = entry.attached {
                attached.shut_down().await;
            }
        }
        info!(closed = count, "gateway shut down");
        Ok(count)
    }

    /// Subscribes to the session events of a connection.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConnectionNotFound`] for unknown ids, or
    /// [`GatewayError::ConnectionNotReady`] while no session is attached.
    pub fn subscribe(&self, id: ConnectionId) -> GatewayResult<broadcast::Receiver<SessionEvent>> {
        let (connection, session) = self.registry.session(id)?;
        session
            .map(|live| live.subscribe())
            .ok_or(GatewayError::ConnectionNotReady {
                connection_id: id,
                state: connection.state(),
            })
    }

    /// Adds tools known out of band to a connection's tool set.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConnectionNotFound`] for unknown ids.
    pub fn register_tools(
        &self,
        id: ConnectionId,
        tools: Vec<ToolDefinition>,
    ) -> GatewayResult<Connection> {
        self.registry
            .update(id, |connection| {
                let mut merged = connection.tools().clone();
                for tool in tools {
                    merged.insert(tool);
                }
                connection.replace_tools(merged);
                connection.clone()
            })?
            .ok_or(GatewayError::ConnectionNotFound(id))
    }

    /// Probes a connection now and returns it with refreshed health.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConnectionNotFound`] for unknown ids, or
    /// [`GatewayError::ConnectionNotReady`] while no session is attached.
    pub async fn check_health(&self, id: ConnectionId) -> GatewayResult<Connection> {
        let (connection, session) = self.registry.session(id)?;
        let live = session.ok_or(GatewayError::ConnectionNotReady {
            connection_id: id,
            state: connection.state(),
        })?;
        health::probe_once(
            &self.registry,
            id,
            &*live,
            self.config.probe_timeout,
            &*self.clock,
        )
        .await?;
        self.get_connection(id)
    }

    async fn authenticate(&self, request: &AuthRequest) -> GatewayResult<AuthContext> {
        let verification = self.verifier.verify(request);
        let context = tokio::time::timeout(self.config.auth_timeout, verification)
            .await
            .map_err(|_| GatewayError::Timeout {
                operation: "credential verification",
                after: self.config.auth_timeout,
            })??;

        if context.is_expired(self.clock.utc()) {
            return Err(GatewayError::AuthFailed {
                code: "TOKEN_EXPIRED".to_owned(),
                message: "verifier issued an already-expired credential".to_owned(),
            });
        }
        Ok(context)
    }

    async fn discover_into(
        &self,
        connection: &mut Connection,
        descriptor: &ServiceDescriptor,
        session: &dyn TransportSession,
    ) -> GatewayResult<()> {
        connection.mark_discovering(session.kind())?;
        let (tools, status) = self.discover(descriptor, session).await;
        connection.mark_connected(tools, status, &*self.clock)?;
        Ok(())
    }

    async fn rediscover(
        &self,
        id: ConnectionId,
        descriptor: &ServiceDescriptor,
        session: &dyn TransportSession,
    ) -> GatewayResult<()> {
        let kind = session.kind();
        self.transition(id, |connection| connection.mark_discovering(kind))?;
        let (tools, status) = self.discover(descriptor, session).await;
        let clock = &*self.clock;
        self.transition(id, |connection| connection.mark_connected(tools, status, clock))
    }

    async fn discover(
        &self,
        descriptor: &ServiceDescriptor,
        session: &dyn TransportSession,
    ) -> (ToolSet, DiscoveryStatus) {
        let reason = match self.list_tools(session).await {
            Ok(tools) => return (tools, DiscoveryStatus::Live),
            Err(reason) => reason,
        };
        warn!(
            service_id = %descriptor.id(),
            transport = %session.kind(),
            reason = %reason,
            "live tool discovery failed"
        );

        match self
            .known_schemas
            .as_ref()
            .and_then(|registry| registry.lookup(descriptor))
        {
            Some(known) => {
                info!(
                    service_id = %descriptor.id(),
                    tools = known.len(),
                    "using known tool schemas"
                );
                (known.into_iter().collect(), DiscoveryStatus::KnownSchema { reason })
            }
            None => (ToolSet::new(), DiscoveryStatus::Degraded { reason }),
        }
    }

    async fn list_tools(&self, session: &dyn TransportSession) -> Result<ToolSet, String> {
        let result = dispatch(
            session,
            TOOLS_LIST_METHOD,
            json!({}),
            self.config.discovery_timeout,
        )
        .await
        .map_err(|err| err.to_string())?;

        let listing = result
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| "tools/list result has no tools array".to_owned())?;
        Ok(listing.iter().filter_map(ToolDefinition::from_listing).collect())
    }

    fn attach(&self, id: ConnectionId, session: Arc<dyn TransportSession>) -> AttachedSession {
        let monitor = health::spawn_monitor(
            Arc::downgrade(&self.registry),
            id,
            Arc::clone(&session),
            self.config.health_interval,
            self.config.probe_timeout,
            Arc::clone(&self.clock),
        );
        let watcher = spawn_watcher(Arc::downgrade(&self.registry), id, Arc::clone(&session));
        AttachedSession::new(session)
            .with_task(monitor)
            .with_task(watcher)
    }

    fn begin_reconnect(&self, id: ConnectionId) -> GatewayResult<Option<AuthContext>> {
        let mut auth = None;
        self.transition(id, |connection| {
            connection.begin_reconnect()?;
            auth = connection.auth().cloned();
            Ok(())
        })?;
        Ok(auth)
    }

    fn transition(
        &self,
        id: ConnectionId,
        change: impl FnOnce(&mut Connection) -> Result<(), ConnectionDomainError>,
    ) -> GatewayResult<()> {
        match self.registry.update(id, change)? {
            Some(result) => Ok(result?),
            None => Err(GatewayError::ConnectionNotFound(id)),
        }
    }

    fn discard(&self, id: ConnectionId, error: GatewayError) -> GatewayError {
        let removed = self.registry.remove(id);
        warn!(
            connection_id = %id,
            code = error.code(),
            error = %error,
            removed = matches!(removed, Ok(Some(_))),
            "reconnect failed; connection removed"
        );
        error
    }
}

fn fail(connection: &mut Connection, error: GatewayError) -> GatewayError {
    if let Err(transition) = connection.mark_failed(error.to_string()) {
        debug!(
            connection_id = %connection.id(),
            error = %transition,
            "failure transition rejected"
        );
    }
    warn!(
        connection_id = %connection.id(),
        service_id = %connection.service_id(),
        code = error.code(),
        error = %error,
        "connection failed"
    );
    error
}

fn spawn_watcher(
    registry: Weak<ConnectionRegistry>,
    id: ConnectionId,
    session: Arc<dyn TransportSession>,
) -> BackgroundTask {
    let mut events = session.subscribe();
    BackgroundTask::new(tokio::spawn(async move {
        if session.is_closed() {
            mark_disconnected(&registry, id, "session closed during establishment");
            return;
        }
        loop {
            match events.recv().await {
                Ok(SessionEvent::Closed { reason }) => {
                    mark_disconnected(&registry, id, &reason);
                    break;
                }
                Ok(SessionEvent::Error { message }) => {
                    warn!(connection_id = %id, error = %message, "session reported an error");
                }
                Ok(SessionEvent::Notification { method, .. }) => {
                    debug!(connection_id = %id, method = %method, "session notification");
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(connection_id = %id, skipped, "session event watcher lagged");
                }
                Err(RecvError::Closed) => {
                    mark_disconnected(&registry, id, "session event channel closed");
                    break;
                }
            }
        }
    }))
}

fn mark_disconnected(registry: &Weak<ConnectionRegistry>, id: ConnectionId, reason: &str) {
    let Some(live) = registry.upgrade() else {
        return;
    };
    let outcome = live.update(id, |connection| {
        if connection.state().accepts_calls() {
            connection.mark_disconnected(reason)
        } else {
            Ok(())
        }
    });
    match outcome {
        Ok(Some(Ok(()))) => info!(connection_id = %id, reason, "connection disconnected"),
        Ok(Some(Err(err))) => debug!(connection_id = %id, error = %err, "disconnect ignored"),
        Ok(None) => debug!(connection_id = %id, "disconnect for unregistered connection"),
        Err(err) => warn!(connection_id = %id, error = %err, "registry unavailable"),
    }
}
