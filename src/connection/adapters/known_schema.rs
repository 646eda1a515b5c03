//! Statically configured tool schemas.

use crate::connection::{
    domain::{ServiceDescriptor, ServiceId, ToolDefinition},
    ports::KnownSchemaRegistry,
};
use std::collections::HashMap;

/// Known schemas keyed by service id, with endpoint host as a fallback key.
#[derive(Debug, Clone, Default)]
pub struct StaticKnownSchemaRegistry {
    by_service: HashMap<ServiceId, Vec<ToolDefinition>>,
    by_host: HashMap<String, Vec<ToolDefinition>>,
}

impl StaticKnownSchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers tools for a service id.
    #[must_use]
    pub fn with_service(mut self, service: ServiceId, tools: Vec<ToolDefinition>) -> Self {
        self.by_service.insert(service, tools);
        self
    }

    /// Registers tools for every service hosted at `host`.
    #[must_use]
    pub fn with_host(mut self, host: &str, tools: Vec<ToolDefinition>) -> Self {
        self.by_host.insert(host.to_ascii_lowercase(), tools);
        self
    }
}

impl KnownSchemaRegistry for StaticKnownSchemaRegistry {
    fn lookup(&self, service: &ServiceDescriptor) -> Option<Vec<ToolDefinition>> {
        self.by_service.get(service.id()).cloned().or_else(|| {
            service
                .endpoint()
                .host_str()
                .and_then(|host| self.by_host.get(&host.to_ascii_lowercase()))
                .cloned()
        })
    }
}
