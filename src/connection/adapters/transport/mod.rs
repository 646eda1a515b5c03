//! Network transport adapters built on `reqwest` and `tokio-tungstenite`.

mod codec;
mod http;
mod session;
mod sse;
mod streamable;
mod websocket;

pub use codec::{SseDecoder, SseEvent};
pub use http::HttpSession;
pub use sse::SseSession;
pub use streamable::{SESSION_ID_HEADER, StreamableHttpSession};
pub use websocket::WebSocketSession;

use crate::config::GatewayConfig;
use crate::connection::{
    domain::TransportKind,
    ports::{ConnectRequest, TransportConnector, TransportError, TransportResult, TransportSession},
};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Connector dialling real endpoints for every [`TransportKind`].
#[derive(Debug, Clone)]
pub struct NetworkTransportConnector {
    client: Client,
    probe_timeout: Duration,
    endpoint_event_wait: Duration,
}

impl NetworkTransportConnector {
    /// Builds a connector whose HTTP client identifies itself with the
    /// configured user agent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Protocol`] when the HTTP client cannot be
    /// initialised.
    pub fn new(config: &GatewayConfig) -> TransportResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(TransportError::protocol)?;
        Ok(Self::with_client(client, config))
    }

    /// Builds a connector around an existing HTTP client.
    #[must_use]
    pub const fn with_client(client: Client, config: &GatewayConfig) -> Self {
        Self {
            client,
            probe_timeout: config.probe_timeout,
            endpoint_event_wait: config.endpoint_event_wait,
        }
    }

    async fn open(&self, request: ConnectRequest) -> TransportResult<Arc<dyn TransportSession>> {
        let ConnectRequest {
            endpoint,
            kind,
            timeout,
            auth,
        } = request;
        let session: Arc<dyn TransportSession> = match kind {
            TransportKind::StreamableHttp => Arc::new(
                StreamableHttpSession::connect(self.client.clone(), &endpoint, auth).await?,
            ),
            TransportKind::WebSocket => {
                Arc::new(WebSocketSession::connect(&endpoint, auth.as_ref()).await?)
            }
            TransportKind::Sse => Arc::new(
                SseSession::connect(
                    self.client.clone(),
                    &endpoint,
                    auth,
                    self.endpoint_event_wait.min(timeout / 2),
                )
                .await?,
            ),
            TransportKind::Http => {
                Arc::new(HttpSession::open(self.client.clone(), &endpoint, auth)?)
            }
        };
        Ok(session)
    }
}

#[async_trait]
impl TransportConnector for NetworkTransportConnector {
    async fn connect(&self, request: ConnectRequest) -> TransportResult<Arc<dyn TransportSession>> {
        let kind = request.kind;
        // The probe runs inside the candidate deadline and must not exhaust it.
        let probe_timeout = self.probe_timeout.min(request.timeout / 2);
        let session = self.open(request).await?;

        match session.probe(probe_timeout).await {
            Ok(latency) => debug!(transport = %kind, latency = ?latency, "initial probe succeeded"),
            Err(error) => warn!(
                transport = %kind,
                endpoint = %session.endpoint(),
                error = %error,
                "initial probe failed; keeping session"
            ),
        }
        Ok(session)
    }
}
