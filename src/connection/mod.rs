//! Connections to remote tool services.
//!
//! A connection moves a single caller-facing session through credential
//! verification, transport negotiation, tool discovery and teardown. The
//! module follows the crate's hexagonal layout:
//!
//! - [`domain`]: descriptors, lifecycle state machine, frames and health
//! - [`ports`]: transport, discovery, credential and schema contracts
//! - [`adapters`]: network transports plus in-memory implementations
//! - [`services`]: correlation, fallback selection, lifecycle and invocation

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
