//! In-memory service registry.

use crate::connection::{
    domain::{ServiceDescriptor, ServiceId},
    ports::{ServiceDiscovery, ServiceDiscoveryError, ServiceDiscoveryResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory service registry.
#[derive(Debug, Clone, Default)]
pub struct InMemoryServiceDiscovery {
    services: Arc<RwLock<HashMap<ServiceId, ServiceDescriptor>>>,
}

impl InMemoryServiceDiscovery {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceDiscoveryError::Upstream`] when the lock is poisoned.
    pub fn register(&self, descriptor: ServiceDescriptor) -> ServiceDiscoveryResult<()> {
        let mut services = self.services.write().map_err(|err| {
            ServiceDiscoveryError::upstream(std::io::Error::other(err.to_string()))
        })?;
        services.insert(descriptor.id().clone(), descriptor);
        Ok(())
    }
}

#[async_trait]
impl ServiceDiscovery for InMemoryServiceDiscovery {
    async fn get_service(
        &self,
        service_id: &ServiceId,
    ) -> ServiceDiscoveryResult<ServiceDescriptor> {
        let services = self.services.read().map_err(|err| {
            ServiceDiscoveryError::upstream(std::io::Error::other(err.to_string()))
        })?;
        services
            .get(service_id)
            .cloned()
            .ok_or_else(|| ServiceDiscoveryError::NotFound(service_id.clone()))
    }
}
