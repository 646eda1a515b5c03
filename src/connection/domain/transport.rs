//! Transport kind value objects.

use super::ParseTransportKindError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire protocol used to reach a remote tool service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Request/stream hybrid: JSON-RPC over HTTP POST whose responses may be
    /// plain JSON or an event stream, with an optional unsolicited-event
    /// stream on the same endpoint.
    StreamableHttp,
    /// Persistent bidirectional socket (WebSocket).
    WebSocket,
    /// Server-push event stream with calls sent on a sideband POST channel.
    Sse,
    /// Stateless request/response over HTTP POST.
    Http,
}

impl TransportKind {
    /// Fallback order when a service does not pin a single transport.
    ///
    /// Earlier kinds carry richer bidirectional execution; later kinds are
    /// more widely available.
    pub const PRIORITY: [Self; 4] = [Self::StreamableHttp, Self::WebSocket, Self::Sse, Self::Http];

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StreamableHttp => "streamable_http",
            Self::WebSocket => "websocket",
            Self::Sse => "sse",
            Self::Http => "http",
        }
    }

    /// Returns the position of this kind in [`Self::PRIORITY`].
    #[must_use]
    pub const fn priority(self) -> usize {
        match self {
            Self::StreamableHttp => 0,
            Self::WebSocket => 1,
            Self::Sse => 2,
            Self::Http => 3,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TransportKind {
    type Error = ParseTransportKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "streamable_http" | "http_stream" | "streamable" => Ok(Self::StreamableHttp),
            "websocket" | "ws" => Ok(Self::WebSocket),
            "sse" | "server_sent_events" => Ok(Self::Sse),
            "http" | "stateless_http" => Ok(Self::Http),
            _ => Err(ParseTransportKindError(value.to_owned())),
        }
    }
}
