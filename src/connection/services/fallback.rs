//! Transport fallback: ordering candidates and trying each until one connects.

use super::{CandidateFailure, GatewayError, GatewayResult};
use crate::connection::{
    domain::{AuthContext, ServiceDescriptor, TransportKind},
    ports::{ConnectRequest, TransportConnector, TransportError, TransportSession},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Returns the transport kinds to attempt for `descriptor`, best first.
///
/// An explicit `requested` kind wins, then a descriptor that declares exactly
/// one kind. Otherwise the declared kinds are tried in priority order, or all
/// four kinds when the descriptor declares none.
#[must_use]
pub fn candidates(
    descriptor: &ServiceDescriptor,
    requested: Option<TransportKind>,
) -> Vec<TransportKind> {
    if let Some(kind) = requested.or_else(|| descriptor.pinned_transport()) {
        return vec![kind];
    }
    if descriptor.transports().is_empty() {
        return TransportKind::PRIORITY.to_vec();
    }
    let mut declared = descriptor.transports().to_vec();
    declared.sort_by_key(|kind| kind.priority());
    declared
}

/// Tries transport candidates in order until one establishes a session.
pub struct FallbackSelector<T: TransportConnector> {
    connector: Arc<T>,
    connect_timeout: Duration,
}

impl<T: TransportConnector> FallbackSelector<T> {
    /// Creates a selector that gives each candidate `connect_timeout`.
    #[must_use]
    pub const fn new(connector: Arc<T>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
        }
    }

    /// Establishes a session with the first candidate that connects.
    ///
    /// `timeout` overrides the per-candidate deadline when present.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConnectionFailed`] listing every attempt when
    /// all candidates fail.
    pub async fn establish(
        &self,
        descriptor: &ServiceDescriptor,
        requested: Option<TransportKind>,
        auth: Option<&AuthContext>,
        timeout: Option<Duration>,
    ) -> GatewayResult<Arc<dyn TransportSession>> {
        let per_candidate = timeout.unwrap_or(self.connect_timeout);
        let kinds = candidates(descriptor, requested);
        let mut failures = Vec::with_capacity(kinds.len());

        for kind in kinds {
            debug!(
                service_id = %descriptor.id(),
                transport = %kind,
                "attempting transport candidate"
            );
            let request = ConnectRequest::new(descriptor.endpoint().clone(), kind, per_candidate)
                .with_auth(auth.cloned());

            match tokio::time::timeout(per_candidate, self.connector.connect(request)).await {
                Ok(Ok(session)) => {
                    info!(
                        service_id = %descriptor.id(),
                        transport = %kind,
                        failed_candidates = failures.len(),
                        "transport established"
                    );
                    return Ok(session);
                }
                Ok(Err(error)) => {
                    warn!(
                        service_id = %descriptor.id(),
                        transport = %kind,
                        error = %error,
                        "transport candidate failed"
                    );
                    failures.push(CandidateFailure { kind, error });
                }
                Err(_) => {
                    warn!(
                        service_id = %descriptor.id(),
                        transport = %kind,
                        "transport candidate timed out"
                    );
                    failures.push(CandidateFailure {
                        kind,
                        error: TransportError::Timeout(per_candidate),
                    });
                }
            }
        }

        Err(GatewayError::ConnectionFailed {
            service_id: descriptor.id().clone(),
            failures,
        })
    }
}
