//! Best-effort periodic health probing.
//!
//! Probe results only ever update health metrics. A failed probe never
//! changes lifecycle state; that is reserved for transport-reported closes.

use super::{BackgroundTask, ConnectionRegistry, GatewayResult};
use crate::connection::{
    domain::{ConnectionId, HealthStatus},
    ports::TransportSession,
};
use mockable::Clock;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Probes `session` once and records the outcome for connection `id`.
///
/// Returns `Ok(None)` when the connection is no longer registered.
///
/// # Errors
///
/// Returns [`super::GatewayError::Internal`] when the registry lock is
/// poisoned. Probe failures are recorded, not returned.
pub async fn probe_once<C: Clock + Send + Sync>(
    registry: &ConnectionRegistry,
    id: ConnectionId,
    session: &dyn TransportSession,
    probe_timeout: Duration,
    clock: &C,
) -> GatewayResult<Option<HealthStatus>> {
    let outcome = session.probe(probe_timeout).await;
    let checked_at = clock.utc();

    registry.update(id, |connection| {
        let health = connection.health_mut();
        match &outcome {
            Ok(latency) => {
                debug!(connection_id = %id, latency = ?latency, "probe succeeded");
                health.record_success(checked_at, *latency);
            }
            Err(error) => {
                warn!(connection_id = %id, error = %error, "probe failed");
                health.record_failure(checked_at, error.to_string());
            }
        }
        health.status()
    })
}

/// Spawns a task probing `session` every `interval` until the connection
/// leaves the registry or the returned handle is dropped.
pub fn spawn_monitor<C>(
    registry: Weak<ConnectionRegistry>,
    id: ConnectionId,
    session: Arc<dyn TransportSession>,
    interval: Duration,
    probe_timeout: Duration,
    clock: Arc<C>,
) -> BackgroundTask
where
    C: Clock + Send + Sync + 'static,
{
    BackgroundTask::new(tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(live) = registry.upgrade() else {
                break;
            };
            match probe_once(&live, id, &*session, probe_timeout, &*clock).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(error) => {
                    warn!(connection_id = %id, error = %error, "health monitor stopping");
                    break;
                }
            }
        }
    }))
}
