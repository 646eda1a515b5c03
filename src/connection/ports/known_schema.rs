//! Fallback tool schemas for services whose transport cannot carry live
//! discovery.

use crate::connection::domain::{ServiceDescriptor, ToolDefinition};

/// Source of statically known tool schemas.
///
/// Consulted only after live discovery over the session has failed.
pub trait KnownSchemaRegistry: Send + Sync {
    /// Returns known tools for `service`, or `None` when nothing is known.
    fn lookup(&self, service: &ServiceDescriptor) -> Option<Vec<ToolDefinition>>;
}
