//! Tool execution on established connections.

use super::{ConnectionRegistry, ErrorBody, GatewayError, GatewayResult, dispatch};
use crate::connection::domain::{ConnectionDomainError, ConnectionId, TOOLS_CALL_METHOD, ToolSet};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Remote error code reported for tool results flagged with `isError`.
pub const TOOL_RESULT_ERROR_CODE: i64 = -32_000;

/// Outcome of a tool call: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolCallEnvelope {
    /// The call succeeded.
    #[serde(rename = "result")]
    Success(Value),
    /// The call failed.
    #[serde(rename = "error")]
    Failure(ErrorBody),
}

impl ToolCallEnvelope {
    /// Normalizes a gateway outcome.
    #[must_use]
    pub fn from_outcome(outcome: &GatewayResult<Value>) -> Self {
        match outcome {
            Ok(result) => Self::Success(result.clone()),
            Err(error) => Self::Failure(error.to_body()),
        }
    }

    /// Returns the result, if the call succeeded.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match self {
            Self::Success(result) => Some(result),
            Self::Failure(_) => None,
        }
    }

    /// Returns the error, if the call failed.
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorBody> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }
}

/// Dispatches named tool calls over registered connections.
pub struct ToolInvoker<C: Clock + Send + Sync> {
    registry: Arc<ConnectionRegistry>,
    clock: Arc<C>,
    call_timeout: Duration,
}

impl<C: Clock + Send + Sync> ToolInvoker<C> {
    /// Creates an invoker whose calls default to `call_timeout`.
    #[must_use]
    pub const fn new(
        registry: Arc<ConnectionRegistry>,
        clock: Arc<C>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            clock,
            call_timeout,
        }
    }

    /// Invokes `tool_name` with `parameters` on connection `id`.
    ///
    /// `timeout` overrides the default call deadline; it is independent of
    /// the connection's establishment deadline. On success the connection's
    /// last-used time is refreshed.
    ///
    /// # Errors
    ///
    /// Returns, in order of checking: [`GatewayError::Validation`] for a
    /// blank tool name or non-object parameters,
    /// [`GatewayError::ConnectionNotFound`],
    /// [`GatewayError::ConnectionNotReady`] unless the connection is
    /// `CONNECTED`, and [`GatewayError::ToolNotFound`] listing available
    /// tools. Dispatch failures map to [`GatewayError::RemoteTool`],
    /// [`GatewayError::Timeout`], [`GatewayError::Disconnected`] or
    /// [`GatewayError::Transport`].
    pub async fn execute_tool(
        &self,
        id: ConnectionId,
        tool_name: &str,
        parameters: Value,
        timeout: Option<Duration>,
    ) -> GatewayResult<Value> {
        let name = tool_name.trim();
        if name.is_empty() {
            return Err(ConnectionDomainError::EmptyToolName.into());
        }
        let arguments = match parameters {
            Value::Null => json!({}),
            Value::Object(_) => parameters,
            _ => return Err(ConnectionDomainError::InvalidToolParameters.into()),
        };

        let (connection, session) = self.registry.session(id)?;
        let not_ready = || GatewayError::ConnectionNotReady {
            connection_id: id,
            state: connection.state(),
        };
        if !connection.state().accepts_calls() {
            return Err(not_ready());
        }
        let live = session.ok_or_else(not_ready)?;
        ensure_known(connection.tools(), name)?;

        let deadline = timeout.unwrap_or(self.call_timeout);
        debug!(
            connection_id = %id,
            transport = %live.kind(),
            tool = name,
            "dispatching tool call"
        );
        let result = dispatch(
            &*live,
            TOOLS_CALL_METHOD,
            json!({"name": name, "arguments": arguments}),
            deadline,
        )
        .await
        .map_err(|err| {
            let error = GatewayError::from(err);
            warn!(
                connection_id = %id,
                tool = name,
                code = error.code(),
                error = %error,
                "tool call failed"
            );
            error
        })?;

        if let Some(error) = flagged_error(&result) {
            return Err(error);
        }
        self.registry
            .update(id, |stored| stored.touch(&*self.clock))?;
        Ok(result)
    }

    /// Invokes a tool and normalizes the outcome into an envelope.
    pub async fn execute(
        &self,
        id: ConnectionId,
        tool_name: &str,
        parameters: Value,
        timeout: Option<Duration>,
    ) -> ToolCallEnvelope {
        let outcome = self.execute_tool(id, tool_name, parameters, timeout).await;
        ToolCallEnvelope::from_outcome(&outcome)
    }
}

fn ensure_known(tools: &ToolSet, name: &str) -> GatewayResult<()> {
    if tools.contains(name) {
        Ok(())
    } else {
        Err(GatewayError::ToolNotFound {
            tool: name.to_owned(),
            available: tools.names(),
        })
    }
}

/// Converts a `tools/call` result with `isError: true` into a remote error.
fn flagged_error(result: &Value) -> Option<GatewayError> {
    if result.get("isError").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    let message = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|content| {
            content
                .iter()
                .find_map(|part| part.get("text").and_then(Value::as_str))
        })
        .unwrap_or("tool reported an error")
        .to_owned();
    Some(GatewayError::RemoteTool {
        code: TOOL_RESULT_ERROR_CODE,
        message,
        data: result.get("content").cloned(),
    })
}
