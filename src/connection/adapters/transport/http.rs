//! Stateless HTTP transport: one POST per call, reply in the body.

use super::codec::SseDecoder;
use super::session::{
    SessionCore, http_endpoint, is_event_stream, rpc_probe, status_error, with_auth,
};
use crate::connection::{
    domain::{AuthContext, RpcRequest, RpcResponse, SessionEvent, TransportKind},
    ports::{TransportError, TransportResult, TransportSession},
    services::RequestCorrelator,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

/// Stateless session. Credentials travel with every call.
#[derive(Debug)]
pub struct HttpSession {
    core: SessionCore,
    client: Client,
    auth: Option<AuthContext>,
}

impl HttpSession {
    /// Prepares a session for `endpoint`. No request is made until the first
    /// call.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unsupported`] for non-HTTP endpoints.
    pub fn open(
        client: Client,
        endpoint: &Url,
        auth: Option<AuthContext>,
    ) -> TransportResult<Self> {
        let target = http_endpoint(endpoint, TransportKind::Http)?;
        Ok(Self {
            core: SessionCore::new(TransportKind::Http, target),
            client,
            auth,
        })
    }
}

#[async_trait]
impl TransportSession for HttpSession {
    fn kind(&self) -> TransportKind {
        self.core.kind
    }

    fn endpoint(&self) -> &Url {
        &self.core.endpoint
    }

    fn correlator(&self) -> &RequestCorrelator {
        &self.core.correlator
    }

    async fn send(&self, request: RpcRequest) -> TransportResult<Option<RpcResponse>> {
        self.core.ensure_open()?;
        let id = request.id;
        let response = with_auth(
            self.client
                .post(self.core.endpoint.clone())
                .header(header::ACCEPT, "application/json, text/event-stream")
                .json(&request),
            self.auth.as_ref(),
        )
        .send()
        .await
        .map_err(|error| TransportError::connect(&self.core.endpoint, error))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let no_reply = || TransportError::protocol("stateless endpoint returned no response");
        if response.status() == StatusCode::ACCEPTED {
            return Err(no_reply());
        }

        let reply = if is_event_stream(&response) {
            let body = response.bytes().await.map_err(TransportError::protocol)?;
            let mut decoder = SseDecoder::new();
            let mut events = decoder.push(&body);
            events.extend(decoder.finish());
            self.core.take_reply_from_events(id, events)
        } else {
            let body = response.text().await.map_err(TransportError::protocol)?;
            if body.trim().is_empty() {
                return Err(no_reply());
            }
            let value = serde_json::from_str(&body).map_err(TransportError::protocol)?;
            self.core.take_reply(id, value)
        };
        reply.map(Some).ok_or_else(no_reply)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.core.subscribe()
    }

    async fn probe(&self, timeout: Duration) -> TransportResult<Duration> {
        rpc_probe(self, timeout).await
    }

    async fn close(&self) {
        self.core.shut("session closed locally");
    }

    fn is_closed(&self) -> bool {
        self.core.is_closed()
    }
}
