//! Port contracts for connection establishment and tool execution.

mod discovery;
mod known_schema;
mod transport;
mod verifier;

pub use discovery::{ServiceDiscovery, ServiceDiscoveryError, ServiceDiscoveryResult};
pub use known_schema::KnownSchemaRegistry;
pub use transport::{
    ConnectRequest, TransportConnector, TransportError, TransportResult, TransportSession,
};
#[cfg(test)]
pub(crate) use verifier::MockCredentialVerifier;
pub use verifier::{CredentialVerifier, CredentialVerifierError, CredentialVerifierResult};
