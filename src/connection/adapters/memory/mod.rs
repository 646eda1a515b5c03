//! In-memory adapters for deterministic tests and embedding.

mod discovery;
mod transport;
mod verifier;

pub use discovery::InMemoryServiceDiscovery;
pub use transport::{ScriptedConnector, ScriptedReply, ScriptedSession};
pub use verifier::StaticCredentialVerifier;
