//! Connection health metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Health status derived from the most recent probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No probe has completed yet.
    Unknown,
    /// The last probe succeeded.
    Healthy,
    /// The last probe failed.
    Unhealthy,
}

impl HealthStatus {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Rolling health metrics for a connection.
///
/// Probe outcomes only ever update these metrics; they never change the
/// connection's lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHealth {
    status: HealthStatus,
    last_probe_at: Option<DateTime<Utc>>,
    last_latency_ms: Option<u64>,
    probes: u64,
    failures: u64,
    last_error: Option<String>,
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHealth {
    /// Creates empty metrics with `unknown` status.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: HealthStatus::Unknown,
            last_probe_at: None,
            last_latency_ms: None,
            probes: 0,
            failures: 0,
            last_error: None,
        }
    }

    /// Records a successful probe.
    pub fn record_success(&mut self, checked_at: DateTime<Utc>, latency: Duration) {
        self.status = HealthStatus::Healthy;
        self.last_probe_at = Some(checked_at);
        self.last_latency_ms = Some(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
        self.probes = self.probes.saturating_add(1);
        self.last_error = None;
    }

    /// Records a failed probe.
    pub fn record_failure(&mut self, checked_at: DateTime<Utc>, message: impl Into<String>) {
        self.status = HealthStatus::Unhealthy;
        self.last_probe_at = Some(checked_at);
        self.probes = self.probes.saturating_add(1);
        self.failures = self.failures.saturating_add(1);
        let normalized = message.into().trim().to_owned();
        self.last_error = (!normalized.is_empty()).then_some(normalized);
    }

    /// Returns the health status.
    #[must_use]
    pub const fn status(&self) -> HealthStatus {
        self.status
    }

    /// Returns the time of the last probe.
    #[must_use]
    pub const fn last_probe_at(&self) -> Option<DateTime<Utc>> {
        self.last_probe_at
    }

    /// Returns the latency of the last successful probe.
    #[must_use]
    pub fn last_latency(&self) -> Option<Duration> {
        self.last_latency_ms.map(Duration::from_millis)
    }

    /// Returns the number of completed probes.
    #[must_use]
    pub const fn probes(&self) -> u64 {
        self.probes
    }

    /// Returns the number of failed probes.
    #[must_use]
    pub const fn failures(&self) -> u64 {
        self.failures
    }

    /// Returns the last probe error message.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the fraction of failed probes in `[0.0, 1.0]`.
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        clippy::cast_precision_loss,
        reason = "error rate is a reporting ratio; probe counts never approach f64 precision limits"
    )]
    pub fn error_rate(&self) -> f64 {
        if self.probes == 0 {
            return 0.0;
        }
        self.failures as f64 / self.probes as f64
    }
}
