//! Service discovery port for resolving registry descriptors.

use crate::connection::domain::{ServiceDescriptor, ServiceId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for discovery operations.
pub type ServiceDiscoveryResult<T> = Result<T, ServiceDiscoveryError>;

/// Read-only access to the external service registry.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    /// Fetches the descriptor for `service_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceDiscoveryError::NotFound`] when the registry has no
    /// such service, or [`ServiceDiscoveryError::Upstream`] when the registry
    /// itself failed.
    async fn get_service(&self, service_id: &ServiceId)
    -> ServiceDiscoveryResult<ServiceDescriptor>;
}

/// Errors returned by discovery adapters.
#[derive(Debug, Clone, Error)]
pub enum ServiceDiscoveryError {
    /// The registry has no service with this identifier.
    #[error("service not found: {0}")]
    NotFound(ServiceId),

    /// The registry could not be queried.
    #[error("service registry error: {0}")]
    Upstream(Arc<dyn std::error::Error + Send + Sync>),
}

impl ServiceDiscoveryError {
    /// Wraps a registry failure.
    pub fn upstream(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Upstream(Arc::new(err))
    }
}
