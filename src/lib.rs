//! Toolgate: a multi-transport gateway to remote tool services.
//!
//! Toolgate establishes connections to remote services that expose callable
//! tools over a JSON-RPC style protocol. Each connection negotiates one of
//! four transports (streamable HTTP, WebSocket, server-sent events with a
//! sideband POST channel, or stateless HTTP), falling back in priority order
//! when a transport is unavailable. Established connections discover their
//! tools, are health-probed in the background, and execute tool calls with
//! per-call deadlines.
//!
//! # Architecture
//!
//! Toolgate follows hexagonal architecture principles:
//!
//! - **Domain**: Pure connection model with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for transports and collaborators
//! - **Adapters**: Concrete transports and in-memory implementations
//! - **Services**: Orchestration of connection lifecycle and tool calls
//!
//! # Modules
//!
//! - [`config`]: Gateway timeouts and client identity
//! - [`connection`]: Connection lifecycle, transports and tool invocation

pub mod config;
pub mod connection;
