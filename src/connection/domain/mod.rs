//! Domain model for gateway connections to remote tool services.
//!
//! The connection domain models service descriptors, credentials, transport
//! kinds, the connection lifecycle state machine, health metrics, discovered
//! tools, and the JSON-RPC frames exchanged with remote services.
//! Infrastructure concerns remain outside this boundary.

mod auth;
mod connection;
mod error;
mod health;
mod ids;
mod message;
mod service;
mod state;
mod tool;
mod transport;

pub use auth::{AUTHORIZATION_HEADER, AuthContext, AuthRequest, WALLET_HEADER};
pub use connection::Connection;
pub use error::{ConnectionDomainError, ParseTransportKindError};
pub use health::{ConnectionHealth, HealthStatus};
pub use ids::{ConnectionId, OwnerTag, RequestId, ServiceId};
pub use message::{
    InboundFrame, JSONRPC_VERSION, PING_METHOD, RpcError, RpcRequest, RpcResponse, SessionEvent,
    TOOLS_CALL_METHOD, TOOLS_LIST_METHOD,
};
pub use service::{AUTH_GATED_TAG, ServiceDescriptor};
pub use state::ConnectionState;
pub use tool::{DiscoveryStatus, ToolDefinition, ToolSet};
pub use transport::TransportKind;
