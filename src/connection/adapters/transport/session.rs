//! State and helpers shared by the network sessions.

use super::codec::{SseDecoder, SseEvent};
use crate::connection::{
    domain::{
        AuthContext, InboundFrame, PING_METHOD, RequestId, RpcResponse, SessionEvent,
        TransportKind,
    },
    ports::{TransportError, TransportResult, TransportSession},
    services::{CallError, RequestCorrelator, dispatch},
};
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

const EVENT_CAPACITY: usize = 128;
const STATUS_BODY_LIMIT: usize = 512;

/// Correlator, event channel and close flag of one session.
///
/// Reader tasks hold an `Arc` to the core, so inbound frames can be routed
/// without a reference back to the owning session.
#[derive(Debug)]
pub(super) struct SessionCore {
    pub(super) kind: TransportKind,
    pub(super) endpoint: Url,
    pub(super) correlator: RequestCorrelator,
    events: broadcast::Sender<SessionEvent>,
    closed: AtomicBool,
}

impl SessionCore {
    pub(super) fn new(kind: TransportKind, endpoint: Url) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            kind,
            endpoint,
            correlator: RequestCorrelator::new(),
            events,
            closed: AtomicBool::new(false),
        }
    }

    pub(super) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(super) fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error for a broadcast.
        drop(self.events.send(event));
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(super) fn ensure_open(&self) -> TransportResult<()> {
        if self.is_closed() {
            Err(TransportError::Closed(format!("{} session is closed", self.kind)))
        } else {
            Ok(())
        }
    }

    /// Marks the session closed, rejects pending calls and emits
    /// [`SessionEvent::Closed`]. Returns `false` if it was already closed.
    pub(super) fn shut(&self, reason: &str) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let rejected = self.correlator.close(reason);
        debug!(transport = %self.kind, rejected, reason, "session closed");
        self.emit(SessionEvent::Closed {
            reason: reason.to_owned(),
        });
        true
    }

    /// Routes one decoded inbound value.
    ///
    /// Responses go to the correlator, notifications to subscribers, and
    /// batches are routed element by element.
    pub(super) fn route(&self, value: Value) {
        match value {
            Value::Array(batch) => batch.into_iter().for_each(|item| self.route(item)),
            other => match InboundFrame::classify(other) {
                InboundFrame::Response(response) => {
                    self.correlator.complete(response);
                }
                InboundFrame::Notification { method, params } => {
                    self.emit(SessionEvent::Notification { method, params });
                }
                InboundFrame::Unrecognized(frame) => {
                    debug!(transport = %self.kind, %frame, "ignoring unrecognized frame");
                }
            },
        }
    }

    /// Parses and routes a text frame, reporting malformed input as an
    /// [`SessionEvent::Error`].
    pub(super) fn route_text(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.route(value),
            Err(error) => self.emit(SessionEvent::Error {
                message: format!("malformed frame: {error}"),
            }),
        }
    }

    /// Splits a reply body into the response for `id` and everything else,
    /// routing the rest.
    ///
    /// A lone response object without an id is taken as the reply to `id`.
    pub(super) fn take_reply(&self, id: RequestId, value: Value) -> Option<RpcResponse> {
        let items = match value {
            Value::Array(batch) => batch,
            Value::Object(mut object) => {
                let carries_outcome =
                    object.contains_key("result") || object.contains_key("error");
                if carries_outcome && object.get("id").is_none_or(Value::is_null) {
                    object.insert("id".to_owned(), json!(id));
                }
                vec![Value::Object(object)]
            }
            other => vec![other],
        };

        let mut reply = None;
        for item in items {
            match InboundFrame::classify(item) {
                InboundFrame::Response(response) if response.id == id && reply.is_none() => {
                    reply = Some(response);
                }
                InboundFrame::Response(response) => {
                    self.correlator.complete(response);
                }
                InboundFrame::Notification { method, params } => {
                    self.emit(SessionEvent::Notification { method, params });
                }
                InboundFrame::Unrecognized(frame) => {
                    debug!(transport = %self.kind, %frame, "ignoring unrecognized frame");
                }
            }
        }
        reply
    }

    /// Pulls the reply to `id` out of server-sent events carried in a POST
    /// response body.
    pub(super) fn take_reply_from_events(
        &self,
        id: RequestId,
        events: Vec<SseEvent>,
    ) -> Option<RpcResponse> {
        let mut reply = None;
        for event in events.into_iter().filter(|event| event.kind() == "message") {
            match serde_json::from_str::<Value>(&event.data) {
                Ok(value) if reply.is_none() => reply = self.take_reply_strict(id, value),
                Ok(value) => self.route(value),
                Err(error) => self.emit(SessionEvent::Error {
                    message: format!("malformed event data: {error}"),
                }),
            }
        }
        reply
    }

    fn take_reply_strict(&self, id: RequestId, value: Value) -> Option<RpcResponse> {
        match InboundFrame::classify(value.clone()) {
            InboundFrame::Response(response) if response.id == id => Some(response),
            _ => {
                self.route(value);
                None
            }
        }
    }
}

/// A reader task aborted when its session is dropped.
#[derive(Debug)]
pub(super) struct ReaderTask(JoinHandle<()>);

impl ReaderTask {
    pub(super) const fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }

    pub(super) fn abort(&self) {
        self.0.abort();
    }
}

impl Drop for ReaderTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Adds credential headers to an outbound HTTP request.
pub(super) fn with_auth(
    builder: reqwest::RequestBuilder,
    auth: Option<&AuthContext>,
) -> reqwest::RequestBuilder {
    auth.map(AuthContext::headers)
        .unwrap_or_default()
        .into_iter()
        .fold(builder, |request, (name, value)| request.header(name, value))
}

/// Rewrites `ws`/`wss` endpoints to their HTTP equivalents.
pub(super) fn http_endpoint(endpoint: &Url, kind: TransportKind) -> TransportResult<Url> {
    rescheme(endpoint, kind, |scheme| match scheme {
        "http" | "ws" => Some("http"),
        "https" | "wss" => Some("https"),
        _ => None,
    })
}

/// Rewrites `http`/`https` endpoints to their WebSocket equivalents.
pub(super) fn ws_endpoint(endpoint: &Url, kind: TransportKind) -> TransportResult<Url> {
    rescheme(endpoint, kind, |scheme| match scheme {
        "ws" | "http" => Some("ws"),
        "wss" | "https" => Some("wss"),
        _ => None,
    })
}

fn rescheme(
    endpoint: &Url,
    kind: TransportKind,
    mapping: impl Fn(&str) -> Option<&'static str>,
) -> TransportResult<Url> {
    let unsupported = || TransportError::Unsupported {
        kind,
        reason: format!("scheme `{}` cannot carry {kind}", endpoint.scheme()),
    };
    let scheme = mapping(endpoint.scheme()).ok_or_else(unsupported)?;
    let mut rewritten = endpoint.clone();
    rewritten.set_scheme(scheme).map_err(|()| unsupported())?;
    Ok(rewritten)
}

/// Converts a non-success response into [`TransportError::Status`].
pub(super) async fn status_error(response: reqwest::Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    TransportError::Status {
        status,
        body: body.chars().take(STATUS_BODY_LIMIT).collect(),
    }
}

/// Returns whether a response declares an event-stream body.
pub(super) fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"))
}

/// Feeds every event of a streaming body to `handle` until the stream ends.
///
/// # Errors
///
/// Returns the transport error that interrupted the stream.
pub(super) async fn read_events(
    response: reqwest::Response,
    mut handle: impl FnMut(SseEvent) + Send,
) -> Result<(), reqwest::Error> {
    let mut decoder = SseDecoder::new();
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        decoder.push(&chunk?).into_iter().for_each(&mut handle);
    }
    decoder.finish().into_iter().for_each(handle);
    Ok(())
}

/// Probes with a `ping` call and reports the round trip.
///
/// A remote error still proves the peer is answering, so it counts as
/// alive.
pub(super) async fn rpc_probe(
    session: &dyn TransportSession,
    timeout: Duration,
) -> TransportResult<Duration> {
    let started = Instant::now();
    match dispatch(session, PING_METHOD, json!({}), timeout).await {
        Ok(_) | Err(CallError::Remote(_)) => Ok(started.elapsed()),
        Err(CallError::Timeout(elapsed)) => Err(TransportError::Timeout(elapsed)),
        Err(CallError::Disconnected(reason)) => Err(TransportError::Closed(reason)),
        Err(CallError::Transport(error)) => Err(error),
    }
}
