//! Service descriptor supplied by the external discovery collaborator.

use super::{ConnectionDomainError, ServiceId, TransportKind};
use serde::{Deserialize, Serialize};
use url::Url;

/// Tag marking a service whose tools are gated behind verified credentials.
pub const AUTH_GATED_TAG: &str = "token-gated";

/// Immutable description of a remote tool-serving endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    id: ServiceId,
    name: String,
    endpoint: Url,
    transports: Vec<TransportKind>,
    tags: Vec<String>,
    tool_names: Vec<String>,
    requires_auth: bool,
}

impl ServiceDescriptor {
    /// Creates a descriptor with no declared transports, tags or tools.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionDomainError::EmptyEndpoint`] or
    /// [`ConnectionDomainError::InvalidEndpoint`] when `endpoint` is not an
    /// absolute `http`, `https`, `ws` or `wss` URL.
    pub fn new(
        id: ServiceId,
        name: impl Into<String>,
        endpoint: &str,
    ) -> Result<Self, ConnectionDomainError> {
        let trimmed = endpoint.trim();
        if trimmed.is_empty() {
            return Err(ConnectionDomainError::EmptyEndpoint);
        }
        let parsed = Url::parse(trimmed)
            .map_err(|_| ConnectionDomainError::InvalidEndpoint(trimmed.to_owned()))?;
        if !matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(ConnectionDomainError::InvalidEndpoint(trimmed.to_owned()));
        }

        Ok(Self {
            id,
            name: name.into().trim().to_owned(),
            endpoint: parsed,
            transports: Vec::new(),
            tags: Vec::new(),
            tool_names: Vec::new(),
            requires_auth: false,
        })
    }

    /// Declares the transports the service supports. Duplicates are dropped.
    #[must_use]
    pub fn with_transports(mut self, transports: impl IntoIterator<Item = TransportKind>) -> Self {
        let mut declared: Vec<TransportKind> = Vec::new();
        for kind in transports {
            if !declared.contains(&kind) {
                declared.push(kind);
            }
        }
        self.transports = declared;
        self
    }

    /// Replaces the descriptive tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Replaces the tool names advertised by the registry.
    #[must_use]
    pub fn with_tool_names(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.tool_names = names.into_iter().collect();
        self
    }

    /// Marks the service as requiring verified credentials.
    #[must_use]
    pub const fn with_auth_required(mut self, required: bool) -> Self {
        self.requires_auth = required;
        self
    }

    /// Returns the service identifier.
    #[must_use]
    pub const fn id(&self) -> &ServiceId {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the declared transports in registry order.
    #[must_use]
    pub fn transports(&self) -> &[TransportKind] {
        &self.transports
    }

    /// Returns the single declared transport, if exactly one is declared.
    #[must_use]
    pub fn pinned_transport(&self) -> Option<TransportKind> {
        match self.transports.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Returns the descriptive tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the tool names advertised by the registry.
    #[must_use]
    pub fn tool_names(&self) -> &[String] {
        &self.tool_names
    }

    /// Returns whether connecting requires a verified auth context.
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.requires_auth
            || self
                .tags
                .iter()
                .any(|tag| tag.eq_ignore_ascii_case(AUTH_GATED_TAG))
    }
}
