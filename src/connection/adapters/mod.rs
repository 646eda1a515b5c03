//! Adapter implementations for connection ports.
//!
//! `transport` dials real endpoints. `memory` holds scripted and in-process
//! implementations used by tests and embedded deployments.

pub mod known_schema;
pub mod memory;
pub mod transport;
