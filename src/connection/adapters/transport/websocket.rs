//! Persistent WebSocket transport.
//!
//! Credentials ride on the upgrade request. One reader task routes every
//! inbound text frame; the session closes when the socket does.

use super::session::{ReaderTask, SessionCore, rpc_probe, ws_endpoint};
use crate::connection::{
    domain::{AuthContext, RpcRequest, RpcResponse, SessionEvent, TransportKind},
    ports::{TransportError, TransportResult, TransportSession},
    services::RequestCorrelator,
};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast};
use tokio_tungstenite::tungstenite::{
    self, Message,
    client::IntoClientRequest,
    http::{HeaderName, HeaderValue},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket session.
pub struct WebSocketSession {
    core: Arc<SessionCore>,
    sink: Mutex<SplitSink<Socket, Message>>,
    reader: ReaderTask,
}

impl WebSocketSession {
    /// Performs the upgrade handshake with credential headers attached.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unsupported`] when the endpoint refuses the
    /// upgrade with an HTTP response, or [`TransportError::Connect`] when it
    /// cannot be reached.
    pub async fn connect(endpoint: &Url, auth: Option<&AuthContext>) -> TransportResult<Self> {
        let kind = TransportKind::WebSocket;
        let target = ws_endpoint(endpoint, kind)?;
        let mut request = target
            .as_str()
            .into_client_request()
            .map_err(|error| TransportError::connect(&target, error))?;
        for (name, value) in auth.map(AuthContext::headers).unwrap_or_default() {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(TransportError::protocol)?;
            let header_value = HeaderValue::from_str(&value).map_err(TransportError::protocol)?;
            request.headers_mut().insert(header_name, header_value);
        }

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|error| match error {
                tungstenite::Error::Http(response) => TransportError::Unsupported {
                    kind,
                    reason: format!("upgrade refused with HTTP {}", response.status()),
                },
                other => TransportError::connect(&target, other),
            })?;

        let (sink, stream) = socket.split();
        let core = Arc::new(SessionCore::new(kind, target));
        let reader = ReaderTask::new(tokio::spawn(read_frames(Arc::clone(&core), stream)));
        Ok(Self {
            core,
            sink: Mutex::new(sink),
            reader,
        })
    }
}

async fn read_frames(core: Arc<SessionCore>, mut stream: SplitStream<Socket>) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => core.route_text(text.as_str()),
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => core.route_text(text),
                Err(error) => core.emit(SessionEvent::Error {
                    message: format!("binary frame is not UTF-8: {error}"),
                }),
            },
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|close| close.reason.to_string())
                    .filter(|text| !text.is_empty())
                    .unwrap_or_else(|| "remote closed the socket".to_owned());
            }
            Some(Ok(_)) => {}
            Some(Err(error)) => break format!("socket error: {error}"),
            None => break "socket stream ended".to_owned(),
        }
    };
    debug!(endpoint = %core.endpoint, reason = %reason, "websocket reader stopped");
    core.shut(&reason);
}

#[async_trait]
impl TransportSession for WebSocketSession {
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
        let text = serde_json::to_string(&request).map_err(TransportError::protocol)?;
        let sent = self.sink.lock().await.send(Message::Text(text.into())).await;
        if let Err(error) = sent {
            let reason = format!("socket write failed: {error}");
            self.core.shut(&reason);
            self.reader.abort();
            return Err(TransportError::Closed(reason));
        }
        Ok(None)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.core.subscribe()
    }

    async fn probe(&self, timeout: Duration) -> TransportResult<Duration> {
        rpc_probe(self, timeout).await
    }

    async fn close(&self) {
        if !self.core.shut("session closed locally") {
            return;
        }
        if let Err(error) = self.sink.lock().await.close().await {
            debug!(error = %error, "websocket close frame not delivered");
        }
        self.reader.abort();
    }

    fn is_closed(&self) -> bool {
        self.core.is_closed()
    }
}
