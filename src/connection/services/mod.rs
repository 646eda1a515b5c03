//! Application services for connection lifecycle and tool execution.

mod correlator;
mod error;
mod fallback;
pub mod health;
mod invoker;
mod lifecycle;
mod registry;

pub use correlator::{CallError, CallResult, RequestCorrelator, dispatch};
pub use error::{
    CANDIDATE_FAILED_CODE, CandidateFailure, ErrorBody, ErrorCategory, GatewayError, GatewayResult,
};
pub use fallback::{FallbackSelector, candidates};
pub use invoker::{TOOL_RESULT_ERROR_CODE, ToolCallEnvelope, ToolInvoker};
pub use lifecycle::{ConnectionLifecycleService, CreateConnectionRequest};
pub use registry::{AttachedSession, BackgroundTask, ConnectionRegistry, RegistryEntry};
