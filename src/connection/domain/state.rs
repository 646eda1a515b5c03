//! Connection lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Connection object created; nothing attempted yet.
    Initializing,
    /// Credentials are being verified.
    Authenticating,
    /// Transport candidates are being tried.
    Connecting,
    /// A session is live and tools are being enumerated.
    Discovering,
    /// Ready for tool calls.
    Connected,
    /// The transport closed after the connection was established.
    Disconnected,
    /// Establishment failed.
    Failed,
}

impl ConnectionState {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Authenticating => "AUTHENTICATING",
            Self::Connecting => "CONNECTING",
            Self::Discovering => "DISCOVERING",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::Failed => "FAILED",
        }
    }

    /// Returns whether tool calls may be dispatched.
    #[must_use]
    pub const fn accepts_calls(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns whether a forward transition to `target` is allowed.
    ///
    /// `Connected -> Connecting` and `Disconnected -> Connecting` are only
    /// taken by an explicit reconnect; see [`Self::can_reconnect`].
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::Initializing,
                Self::Authenticating | Self::Connecting | Self::Failed
            ) | (Self::Authenticating, Self::Connecting | Self::Failed)
                | (Self::Connecting, Self::Discovering | Self::Failed)
                | (Self::Discovering, Self::Connected | Self::Failed)
                | (Self::Connected, Self::Disconnected | Self::Failed)
        )
    }

    /// Returns whether an explicit reconnect may start from this state.
    #[must_use]
    pub const fn can_reconnect(self) -> bool {
        matches!(self, Self::Connected | Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
