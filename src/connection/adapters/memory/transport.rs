//! Scripted in-memory transport for deterministic lifecycle tests.
//!
//! [`ScriptedConnector`] records every establishment attempt and hands out
//! pre-built [`ScriptedSession`]s per transport kind. Sessions answer calls
//! from per-method reply scripts instead of a network peer.

use crate::connection::{
    domain::{RpcError, RpcRequest, RpcResponse, SessionEvent, TransportKind},
    ports::{ConnectRequest, TransportConnector, TransportError, TransportResult, TransportSession},
    services::RequestCorrelator,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

const EVENT_CAPACITY: usize = 64;

/// How a scripted session answers one call.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    /// Reply synchronously with a result.
    Result(Value),
    /// Reply synchronously with a remote error.
    Error(RpcError),
    /// Accept the frame and never reply.
    Silent,
    /// Fail to transmit the frame.
    Fail(TransportError),
}

#[derive(Debug, Default)]
struct SessionScript {
    replies: HashMap<String, VecDeque<ScriptedReply>>,
    sent: Vec<RpcRequest>,
    probe_failure: Option<TransportError>,
}

/// In-memory session answering calls from scripts.
///
/// Each method keeps a queue of replies; the last reply in a queue is
/// repeated for any further calls. Unscripted methods fail with
/// [`TransportError::Protocol`].
#[derive(Debug)]
pub struct ScriptedSession {
    kind: TransportKind,
    endpoint: Url,
    correlator: RequestCorrelator,
    events: broadcast::Sender<SessionEvent>,
    script: Mutex<SessionScript>,
    closed: AtomicBool,
}

impl ScriptedSession {
    /// Creates a session for `kind` with a placeholder endpoint.
    ///
    /// # Panics
    ///
    /// Never in practice: the placeholder endpoint is a constant that always
    /// parses.
    #[must_use]
    #[expect(clippy::expect_used, reason = "static URL literal always parses")]
    pub fn new(kind: TransportKind) -> Arc<Self> {
        let endpoint = Url::parse("memory://scripted/").expect("static scripted endpoint");
        Self::with_endpoint(kind, endpoint)
    }

    /// Creates a session for `kind` bound to `endpoint`.
    #[must_use]
    pub fn with_endpoint(kind: TransportKind, endpoint: Url) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            kind,
            endpoint,
            correlator: RequestCorrelator::new(),
            events,
            script: Mutex::new(SessionScript::default()),
            closed: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionScript> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a reply to the queue for `method`.
    pub fn script(&self, method: &str, reply: ScriptedReply) {
        self.lock()
            .replies
            .entry(method.to_owned())
            .or_default()
            .push_back(reply);
    }

    /// Scripts a `tools/list` reply advertising `names`.
    pub fn script_tools(&self, names: &[&str]) {
        let tools: Vec<Value> = names
            .iter()
            .map(|name| json!({"name": name, "inputSchema": {"type": "object"}}))
            .collect();
        self.script(
            crate::connection::domain::TOOLS_LIST_METHOD,
            ScriptedReply::Result(json!({"tools": tools})),
        );
    }

    /// Makes subsequent probes fail with `error`.
    pub fn fail_probes(&self, error: TransportError) {
        self.lock().probe_failure = Some(error);
    }

    /// Returns every request frame transmitted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<RpcRequest> {
        self.lock().sent.clone()
    }

    /// Publishes an event to subscribers.
    pub fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error for a broadcast.
        drop(self.events.send(event));
    }

    /// Simulates a transport-reported close.
    pub fn remote_close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.correlator.close(reason);
        self.emit(SessionEvent::Closed {
            reason: reason.to_owned(),
        });
    }

    fn next_reply(&self, method: &str) -> Option<ScriptedReply> {
        let mut script = self.lock();
        let queue = script.replies.get_mut(method)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl TransportSession for ScriptedSession {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    async fn send(&self, request: RpcRequest) -> TransportResult<Option<RpcResponse>> {
        if self.is_closed() {
            return Err(TransportError::Closed("scripted session closed".to_owned()));
        }
        let id = request.id;
        let method = request.method.clone();
        self.lock().sent.push(request);

        match self.next_reply(&method) {
            Some(ScriptedReply::Result(result)) => Ok(Some(RpcResponse::success(id, result))),
            Some(ScriptedReply::Error(error)) => Ok(Some(RpcResponse::failure(id, error))),
            Some(ScriptedReply::Silent) => Ok(None),
            Some(ScriptedReply::Fail(error)) => Err(error),
            None => Err(TransportError::Protocol(format!(
                "no scripted reply for method '{method}'"
            ))),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn probe(&self, _timeout: Duration) -> TransportResult<Duration> {
        match self.lock().probe_failure.clone() {
            Some(error) => Err(error),
            None => Ok(Duration::from_millis(1)),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.correlator.close("session closed locally");
        self.emit(SessionEvent::Closed {
            reason: "session closed locally".to_owned(),
        });
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct ConnectorState {
    outcomes: HashMap<TransportKind, Result<Arc<ScriptedSession>, TransportError>>,
    attempts: Vec<ConnectRequest>,
}

/// Connector that records attempts and returns scripted outcomes.
///
/// Kinds without a scripted outcome fail with
/// [`TransportError::Unsupported`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl ScriptedConnector {
    /// Creates a connector with no scripted outcomes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `kind` succeed with `session`.
    pub fn accept(&self, kind: TransportKind, session: Arc<ScriptedSession>) {
        self.lock().outcomes.insert(kind, Ok(session));
    }

    /// Makes `kind` fail with `error`.
    pub fn reject(&self, kind: TransportKind, error: TransportError) {
        self.lock().outcomes.insert(kind, Err(error));
    }

    /// Returns the transport kinds attempted, in order.
    #[must_use]
    pub fn attempted_kinds(&self) -> Vec<TransportKind> {
        self.lock().attempts.iter().map(|attempt| attempt.kind).collect()
    }

    /// Returns every connect request received, in order.
    #[must_use]
    pub fn attempts(&self) -> Vec<ConnectRequest> {
        self.lock().attempts.clone()
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn connect(&self, request: ConnectRequest) -> TransportResult<Arc<dyn TransportSession>> {
        let kind = request.kind;
        let outcome = {
            let mut state = self.lock();
            state.attempts.push(request);
            state.outcomes.get(&kind).cloned()
        };

        match outcome {
            Some(Ok(session)) => Ok(session),
            Some(Err(error)) => Err(error),
            None => Err(TransportError::Unsupported {
                kind,
                reason: "no scripted session".to_owned(),
            }),
        }
    }
}
