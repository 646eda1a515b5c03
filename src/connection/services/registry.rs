//! The connection registry: the one shared mutable structure of the gateway.
//!
//! Constructed once and handed to every service that needs it. The lock is
//! only ever held inside synchronous methods, so no guard crosses an await.

use super::{GatewayError, GatewayResult};
use crate::connection::{
    domain::{Connection, ConnectionId, ConnectionState, OwnerTag, ServiceDescriptor, TransportKind},
    ports::TransportSession,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// A spawned task that is aborted when dropped.
#[derive(Debug)]
pub struct BackgroundTask(JoinHandle<()>);

impl BackgroundTask {
    /// Wraps a spawned task.
    #[must_use]
    pub const fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A live session with the background tasks watching it.
pub struct AttachedSession {
    /// The wire session.
    pub session: Arc<dyn TransportSession>,
    /// Health monitor and event watcher; aborted on drop.
    pub tasks: Vec<BackgroundTask>,
}

impl AttachedSession {
    /// Attaches `session` with no background tasks.
    #[must_use]
    pub const fn new(session: Arc<dyn TransportSession>) -> Self {
        Self {
            session,
            tasks: Vec::new(),
        }
    }

    /// Adds a background task tied to this session.
    #[must_use]
    pub fn with_task(mut self, task: BackgroundTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// Stops background tasks and closes the session.
    pub async fn shut_down(self) {
        let Self { session, tasks } = self;
        drop(tasks);
        session.close().await;
    }
}

/// Everything the registry tracks for one connection.
pub struct RegistryEntry {
    /// Connection aggregate.
    pub connection: Connection,
    /// Descriptor the connection was created from, kept for reconnects.
    pub descriptor: ServiceDescriptor,
    /// Transport explicitly requested at creation, if any.
    pub requested_transport: Option<TransportKind>,
    /// Live session, absent while reconnecting.
    pub attached: Option<AttachedSession>,
}

/// Thread-safe map of connection id to connection, session and tasks.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<ConnectionId, RegistryEntry>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> GatewayResult<RwLockReadGuard<'_, HashMap<ConnectionId, RegistryEntry>>> {
        self.entries.read().map_err(GatewayError::internal)
    }

    fn write(&self) -> GatewayResult<RwLockWriteGuard<'_, HashMap<ConnectionId, RegistryEntry>>> {
        self.entries.write().map_err(GatewayError::internal)
    }

    /// Stores a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the lock is poisoned or the id
    /// is already registered.
    pub fn insert(&self, entry: RegistryEntry) -> GatewayResult<()> {
        let mut entries = self.write()?;
        let id = entry.connection.id();
        if entries.contains_key(&id) {
            return Err(GatewayError::internal(format!(
                "connection {id} is already registered"
            )));
        }
        entries.insert(id, entry);
        Ok(())
    }

    /// Removes an entry, returning it when present.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the lock is poisoned.
    pub fn remove(&self, id: ConnectionId) -> GatewayResult<Option<RegistryEntry>> {
        Ok(self.write()?.remove(&id))
    }

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the lock is poisoned.
    pub fn drain(&self) -> GatewayResult<Vec<RegistryEntry>> {
        Ok(self.write()?.drain().map(|(_, entry)| entry).collect())
    }

    /// Returns a snapshot of one connection.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the lock is poisoned.
    pub fn get(&self, id: ConnectionId) -> GatewayResult<Option<Connection>> {
        Ok(self.read()?.get(&id).map(|entry| entry.connection.clone()))
    }

    /// Returns a connection snapshot with its live session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConnectionNotFound`] for unknown ids, or
    /// [`GatewayError::Internal`] when the lock is poisoned.
    pub fn session(
        &self,
        id: ConnectionId,
    ) -> GatewayResult<(Connection, Option<Arc<dyn TransportSession>>)> {
        let entries = self.read()?;
        let entry = entries
            .get(&id)
            .ok_or(GatewayError::ConnectionNotFound(id))?;
        let session = entry
            .attached
            .as_ref()
            .map(|attached| Arc::clone(&attached.session));
        Ok((entry.connection.clone(), session))
    }

    /// Returns the descriptor and requested transport for a reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConnectionNotFound`] for unknown ids, or
    /// [`GatewayError::Internal`] when the lock is poisoned.
    pub fn origin(
        &self,
        id: ConnectionId,
    ) -> GatewayResult<(ServiceDescriptor, Option<TransportKind>)> {
        let entries = self.read()?;
        let entry = entries
            .get(&id)
            .ok_or(GatewayError::ConnectionNotFound(id))?;
        Ok((entry.descriptor.clone(), entry.requested_transport))
    }

    /// Applies `change` to a stored connection and returns its result.
    ///
    /// Returns `Ok(None)` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the lock is poisoned.
    pub fn update<R>(
        &self,
        id: ConnectionId,
        change: impl FnOnce(&mut Connection) -> R,
    ) -> GatewayResult<Option<R>> {
        let mut entries = self.write()?;
        Ok(entries.get_mut(&id).map(|entry| change(&mut entry.connection)))
    }

    /// Swaps the attached session, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConnectionNotFound`] for unknown ids, or
    /// [`GatewayError::Internal`] when the lock is poisoned.
    pub fn replace_session(
        &self,
        id: ConnectionId,
        attached: Option<AttachedSession>,
    ) -> GatewayResult<Option<AttachedSession>> {
        let mut entries = self.write()?;
        let entry = entries
            .get_mut(&id)
            .ok_or(GatewayError::ConnectionNotFound(id))?;
        Ok(std::mem::replace(&mut entry.attached, attached))
    }

    /// Lists connections that are not `DISCONNECTED`, oldest first.
    ///
    /// With an `owner`, only connections carrying that tag are returned.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the lock is poisoned.
    pub fn list(&self, owner: Option<&OwnerTag>) -> GatewayResult<Vec<Connection>> {
        let entries = self.read()?;
        let mut listed: Vec<Connection> = entries
            .values()
            .map(|entry| &entry.connection)
            .filter(|connection| connection.state() != ConnectionState::Disconnected)
            .filter(|connection| owner.is_none_or(|tag| connection.owner() == Some(tag)))
            .cloned()
            .collect();
        listed.sort_by_key(Connection::created_at);
        Ok(listed)
    }

    /// Returns ids of connections unused for longer than `idle_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the lock is poisoned.
    pub fn idle_ids(
        &self,
        now: DateTime<Utc>,
        idle_timeout: Duration,
    ) -> GatewayResult<Vec<ConnectionId>> {
        Ok(self
            .read()?
            .values()
            .filter(|entry| entry.connection.is_idle(now, idle_timeout))
            .map(|entry| entry.connection.id())
            .collect())
    }

    /// Returns the number of registered connections, in any state.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the lock is poisoned.
    pub fn len(&self) -> GatewayResult<usize> {
        Ok(self.read()?.len())
    }

    /// Returns whether the registry is empty.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the lock is poisoned.
    pub fn is_empty(&self) -> GatewayResult<bool> {
        Ok(self.read()?.is_empty())
    }
}
