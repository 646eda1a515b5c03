//! Server-sent events with a sideband POST channel.
//!
//! The GET stream carries pushed frames and, usually first, an `endpoint`
//! event naming the URL that accepts calls. The session is live once the
//! stream opens with an event-stream content type; a missing or unreachable
//! sideband leaves it live but unable to execute calls.

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
use reqwest::{Client, Response, StatusCode, header};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info};
use url::Url;

/// SSE session: push stream plus sideband POST endpoint.
#[derive(Debug)]
pub struct SseSession {
    core: Arc<SessionCore>,
    client: Client,
    auth: Option<AuthContext>,
    sideband: Url,
    stream: ReaderTask,
}

impl SseSession {
    /// Opens the push stream and waits up to `endpoint_wait` for the
    /// sideband announcement. Without one, calls are posted to the stream
    /// URL itself.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] when the endpoint is unreachable,
    /// or [`TransportError::Unsupported`] when it does not answer with an
    /// event stream.
    pub async fn connect(
        client: Client,
        endpoint: &Url,
        auth: Option<AuthContext>,
        endpoint_wait: Duration,
    ) -> TransportResult<Self> {
        let kind = TransportKind::Sse;
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

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Unsupported {
                kind,
                reason: format!("stream request answered with HTTP {status}"),
            });
        }
        if !is_event_stream(&response) {
            return Err(TransportError::Unsupported {
                kind,
                reason: "response is not an event stream".to_owned(),
            });
        }

        let core = Arc::new(SessionCore::new(kind, target.clone()));
        let (announce, announced) = oneshot::channel();
        let stream = ReaderTask::new(tokio::spawn(read_push(
            Arc::clone(&core),
            response,
            target.clone(),
            announce,
        )));

        let sideband = match tokio::time::timeout(endpoint_wait, announced).await {
            Ok(Ok(url)) => url,
            Ok(Err(_)) | Err(_) => {
                debug!(endpoint = %target, "no endpoint event; posting calls to the stream URL");
                target
            }
        };
        info!(endpoint = %core.endpoint, sideband = %sideband, "event stream established");

        Ok(Self {
            core,
            client,
            auth,
            sideband,
            stream,
        })
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> TransportError {
        TransportError::ExecutionUnavailable(format!("sideband {}: {reason}", self.sideband))
    }
}

async fn read_push(
    core: Arc<SessionCore>,
    response: Response,
    base: Url,
    announce: oneshot::Sender<Url>,
) {
    let mut pending_announce = Some(announce);
    let outcome = read_events(response, |event| match event.kind() {
        "endpoint" => match (resolve_sideband(&base, &event.data), pending_announce.take()) {
            (Some(url), Some(sender)) => drop(sender.send(url)),
            (Some(url), None) => debug!(sideband = %url, "ignoring repeated endpoint event"),
            (None, sender) => {
                pending_announce = sender;
                core.emit(SessionEvent::Error {
                    message: format!("unusable endpoint event: {}", event.data),
                });
            }
        },
        "message" => core.route_text(&event.data),
        other => debug!(event = other, "ignoring server-sent event"),
    })
    .await;

    let reason = match outcome {
        Ok(()) => "event stream ended".to_owned(),
        Err(error) => format!("event stream interrupted: {error}"),
    };
    core.shut(&reason);
}

/// Resolves an `endpoint` event payload against the stream URL.
///
/// The payload is either a bare URL or path, or a JSON object with a `uri`
/// field.
fn resolve_sideband(base: &Url, data: &str) -> Option<Url> {
    let trimmed = data.trim();
    let announced = if trimmed.starts_with('{') {
        serde_json::from_str::<Value>(trimmed)
            .ok()?
            .get("uri")?
            .as_str()?
            .to_owned()
    } else {
        trimmed.to_owned()
    };
    if announced.is_empty() {
        return None;
    }
    base.join(&announced).ok()
}

#[async_trait]
impl TransportSession for SseSession {
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
            self.client.post(self.sideband.clone()).json(&request),
            self.auth.as_ref(),
        )
        .send()
        .await
        .map_err(|error| self.unavailable(format_args!("unreachable: {error}")))?;

        let status = response.status();
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED) {
            return Err(self.unavailable(format_args!("rejected calls with HTTP {status}")));
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }
        if status == StatusCode::ACCEPTED {
            return Ok(None);
        }

        let body = response.text().await.map_err(TransportError::protocol)?;
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Ok(self.core.take_reply(id, value)),
            Err(_) => {
                debug!(request_id = %id, "sideband acknowledged; awaiting pushed reply");
                Ok(None)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.core.subscribe()
    }

    async fn probe(&self, timeout: Duration) -> TransportResult<Duration> {
        rpc_probe(self, timeout).await
    }

    async fn close(&self) {
        self.stream.abort();
        self.core.shut("session closed locally");
    }

    fn is_closed(&self) -> bool {
        self.core.is_closed()
    }
}
