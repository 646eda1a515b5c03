//! Hybrid streamable HTTP transport.
//!
//! Calls are POSTed and answered either with a JSON body or with a short
//! event stream. The server may also push frames over a long-lived GET
//! stream; a `405` on that GET means it offers no push channel.
//!
//! The push stream is optional, so its end never closes the session. The
//! server ends a session by answering a request that carries its session id
//! with `404`; that closes the session and rejects every pending call.

use super::codec::SseDecoder;
use super::session::{
    ReaderTask, SessionCore, http_endpoint, is_event_stream, read_events, rpc_probe,
    status_error, with_auth,
};
use crate::connection::{
    domain::{AuthContext, RpcRequest, RpcResponse, SessionEvent, TransportKind},
    ports::{TransportError, TransportResult, TransportSession},
    services::RequestCorrelator,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

/// Header carrying the server-assigned session id.
pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Streamable HTTP session with an optional push stream.
#[derive(Debug)]
pub struct StreamableHttpSession {
    core: Arc<SessionCore>,
    client: Client,
    auth: Option<AuthContext>,
    session_id: Mutex<Option<String>>,
    push: Mutex<Option<ReaderTask>>,
}

impl StreamableHttpSession {
    /// Opens the push stream and returns a live session.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] when the endpoint is unreachable,
    /// or [`TransportError::Unsupported`] when it answers the handshake with
    /// anything other than an event stream or `405`.
    pub async fn connect(
        client: Client,
        endpoint: &Url,
        auth: Option<AuthContext>,
    ) -> TransportResult<Self> {
        let kind = TransportKind::StreamableHttp;
        let target = http_endpoint(endpoint, kind)?;
        let response = with_auth(
            client
                .get(target.clone())
                .header(header::ACCEPT, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache"),
            auth.as_ref(),
        )
        .send()
        .await
        .map_err(|error| TransportError::connect(&target, error))?;

        let core = Arc::new(SessionCore::new(kind, target));
        let session_id = session_id_of(&response);
        let status = response.status();
        let push = if status == StatusCode::METHOD_NOT_ALLOWED {
            debug!(endpoint = %core.endpoint, "server offers no push stream");
            None
        } else if status.is_success() && is_event_stream(&response) {
            Some(spawn_push_reader(Arc::clone(&core), response))
        } else {
            return Err(TransportError::Unsupported {
                kind,
                reason: format!("handshake answered with HTTP {status}"),
            });
        };

        Ok(Self {
            core,
            client,
            auth,
            session_id: Mutex::new(session_id),
            push: Mutex::new(push),
        })
    }

    fn current_session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remember_session_id(&self, response: &Response) {
        if let Some(assigned) = session_id_of(response) {
            *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(assigned);
        }
    }

    fn with_session(&self, builder: RequestBuilder) -> RequestBuilder {
        let scoped = match self.current_session_id() {
            Some(id) => builder.header(SESSION_ID_HEADER, id),
            None => builder,
        };
        with_auth(scoped, self.auth.as_ref())
    }
}

fn session_id_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn spawn_push_reader(core: Arc<SessionCore>, response: Response) -> ReaderTask {
    ReaderTask::new(tokio::spawn(async move {
        let outcome = read_events(response, |event| {
            if event.kind() == "message" {
                core.route_text(&event.data);
            }
        })
        .await;
        match outcome {
            Ok(()) => debug!(endpoint = %core.endpoint, "push stream ended"),
            Err(error) => {
                warn!(endpoint = %core.endpoint, error = %error, "push stream interrupted");
                core.emit(SessionEvent::Error {
                    message: format!("push stream interrupted: {error}"),
                });
            }
        }
    }))
}

#[async_trait]
impl TransportSession for StreamableHttpSession {
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
        let scoped = self.current_session_id();
        let response = self
            .with_session(
                self.client
                    .post(self.core.endpoint.clone())
                    .header(header::ACCEPT, "application/json, text/event-stream")
                    .json(&request),
            )
            .send()
            .await
            .map_err(|error| TransportError::connect(&self.core.endpoint, error))?;

        if let (StatusCode::NOT_FOUND, Some(session_id)) = (response.status(), scoped) {
            let reason = format!("server terminated session {session_id}");
            self.core.shut(&reason);
            return Err(TransportError::Closed(reason));
        }
        self.remember_session_id(&response);
        if response.status() == StatusCode::ACCEPTED {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        if is_event_stream(&response) {
            let body = response.bytes().await.map_err(TransportError::protocol)?;
            let mut decoder = SseDecoder::new();
            let mut events = decoder.push(&body);
            events.extend(decoder.finish());
            return Ok(self.core.take_reply_from_events(id, events));
        }

        let body = response.text().await.map_err(TransportError::protocol)?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(&body).map_err(TransportError::protocol)?;
        Ok(self.core.take_reply(id, value))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.core.subscribe()
    }

    async fn probe(&self, timeout: Duration) -> TransportResult<Duration> {
        rpc_probe(self, timeout).await
    }

    async fn close(&self) {
        if let Some(reader) = self.push.lock().unwrap_or_else(PoisonError::into_inner).take() {
            reader.abort();
        }
        if !self.core.shut("session closed locally") {
            return;
        }
        if self.current_session_id().is_some() {
            let terminated = self
                .with_session(self.client.delete(self.core.endpoint.clone()))
                .timeout(CLOSE_TIMEOUT)
                .send()
                .await;
            if let Err(error) = terminated {
                debug!(error = %error, "session termination request failed");
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.core.is_closed()
    }
}
