//! Gateway configuration.
//!
//! Every suspension point has its own deadline. Durations deserialize from
//! integer milliseconds so configuration files stay readable:
//!
//! ```
//! use toolgate::config::GatewayConfig;
//!
//! let config: GatewayConfig =
//!     serde_json::from_str(r#"{"call_timeout": 5000}"#).expect("valid config");
//! assert_eq!(config.call_timeout.as_secs(), 5);
//! assert_eq!(config.connect_timeout.as_secs(), 30);
//! ```

use crate::connection::domain::ConnectionDomainError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default `User-Agent` sent by network transports.
pub const DEFAULT_USER_AGENT: &str = concat!("toolgate/", env!("CARGO_PKG_VERSION"));

/// Deadlines and intervals used by the connection layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Handshake deadline applied to each fallback candidate.
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Default deadline for one tool call.
    #[serde(with = "millis")]
    pub call_timeout: Duration,
    /// Deadline for the capability discovery round-trip.
    #[serde(with = "millis")]
    pub discovery_timeout: Duration,
    /// Deadline for the credential verifier, independent of transport.
    #[serde(with = "millis")]
    pub auth_timeout: Duration,
    /// Deadline for a single liveness probe.
    #[serde(with = "millis")]
    pub probe_timeout: Duration,
    /// Interval between health probes.
    #[serde(with = "millis")]
    pub health_interval: Duration,
    /// Connections unused for longer than this are evicted.
    #[serde(with = "millis")]
    pub idle_timeout: Duration,
    /// How long a server-push session waits for its sideband endpoint.
    #[serde(with = "millis")]
    pub endpoint_event_wait: Duration,
    /// `User-Agent` header for HTTP-based transports.
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(30),
            discovery_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            health_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(30 * 60),
            endpoint_event_wait: Duration::from_secs(2),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl GatewayConfig {
    /// Sets the per-candidate handshake deadline.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the default tool-call deadline.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the discovery deadline.
    #[must_use]
    pub const fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Sets the credential verification deadline.
    #[must_use]
    pub const fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Sets the probe deadline.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the health probe interval.
    #[must_use]
    pub const fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Sets the idle eviction threshold.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the sideband endpoint wait for server-push sessions.
    #[must_use]
    pub const fn with_endpoint_event_wait(mut self, wait: Duration) -> Self {
        self.endpoint_event_wait = wait;
        self
    }

    /// Sets the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Checks that every deadline is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionDomainError::ZeroDuration`] naming the first zero
    /// field.
    pub fn validate(&self) -> Result<(), ConnectionDomainError> {
        let fields = [
            ("connect_timeout", self.connect_timeout),
            ("call_timeout", self.call_timeout),
            ("discovery_timeout", self.discovery_timeout),
            ("auth_timeout", self.auth_timeout),
            ("probe_timeout", self.probe_timeout),
            ("health_interval", self.health_interval),
            ("idle_timeout", self.idle_timeout),
            ("endpoint_event_wait", self.endpoint_event_wait),
        ];
        match fields.into_iter().find(|(_, value)| value.is_zero()) {
            Some((name, _)) => Err(ConnectionDomainError::ZeroDuration(name)),
            None => Ok(()),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
