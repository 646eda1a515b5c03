//! Local JSON-RPC tool servers speaking each wire protocol.

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use toolgate::connection::adapters::transport::SESSION_ID_HEADER;
use wiremock::{Request, Respond, ResponseTemplate};

/// Tools advertised by every test server.
pub const SERVER_TOOLS: [&str; 3] = ["echo", "hangup", "slow"];

/// Delay before the WebSocket server answers the `slow` tool.
pub const SLOW_REPLY: Duration = Duration::from_millis(300);

/// Builds the JSON-RPC reply a tool server sends for `frame`.
pub fn reply_to(frame: &Value) -> Value {
    let id = frame.get("id").cloned().unwrap_or(Value::Null);
    let params = frame.get("params").cloned().unwrap_or(Value::Null);
    let result = match frame.get("method").and_then(Value::as_str) {
        Some("ping") => json!({}),
        Some("tools/list") => {
            let tools: Vec<Value> = SERVER_TOOLS
                .iter()
                .map(|name| json!({"name": name, "inputSchema": {"type": "object"}}))
                .collect();
            json!({"tools": tools})
        }
        Some("tools/call") => {
            let text = params
                .pointer("/arguments/text")
                .and_then(Value::as_str)
                .unwrap_or("pong");
            json!({"content": [{"type": "text", "text": text}]})
        }
        _ => {
            return json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32_601, "message": "method not found"},
            });
        }
    };
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

/// Answers POSTed frames in the response body.
pub struct RpcResponder {
    session_id: Option<String>,
    event_stream: bool,
}

impl RpcResponder {
    /// Replies with `application/json` bodies.
    pub const fn json() -> Self {
        Self {
            session_id: None,
            event_stream: false,
        }
    }

    /// Replies with a one-event `text/event-stream` body.
    pub const fn event_stream() -> Self {
        Self {
            session_id: None,
            event_stream: true,
        }
    }

    /// Assigns `id` as the server session on every reply.
    pub fn with_session_id(self, id: &str) -> Self {
        Self {
            session_id: Some(id.to_owned()),
            ..self
        }
    }
}

impl Respond for RpcResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(frame) = request.body_json::<Value>() else {
            return ResponseTemplate::new(400);
        };
        let reply = reply_to(&frame);
        let template = if self.event_stream {
            ResponseTemplate::new(200)
                .set_body_raw(format!("event: message\ndata: {reply}\n\n"), "text/event-stream")
        } else {
            ResponseTemplate::new(200).set_body_json(reply)
        };
        match &self.session_id {
            Some(id) => template.insert_header(SESSION_ID_HEADER, id.as_str()),
            None => template,
        }
    }
}

/// Sideband that acknowledges with `202` and pushes the reply over a
/// separate event stream.
pub struct PushResponder {
    frames: mpsc::UnboundedSender<Value>,
}

impl PushResponder {
    /// Pushes every reply into `frames`.
    pub const fn new(frames: mpsc::UnboundedSender<Value>) -> Self {
        Self { frames }
    }
}

impl Respond for PushResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(frame) = request.body_json::<Value>() else {
            return ResponseTemplate::new(400);
        };
        drop(self.frames.send(reply_to(&frame)));
        ResponseTemplate::new(202)
    }
}

/// WebSocket tool server on an ephemeral port.
pub struct WebSocketServer {
    url: String,
    task: JoinHandle<()>,
}

impl WebSocketServer {
    /// Starts accepting sockets.
    ///
    /// The `slow` tool answers after [`SLOW_REPLY`]; the `hangup` tool
    /// closes the socket instead of answering.
    pub async fn start() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("ws://{}/ws", listener.local_addr()?);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_socket(stream));
            }
        });
        Ok(Self { url, task })
    }

    /// Returns the server URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for WebSocketServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn text_frame(value: &Value) -> Message {
    Message::Text(value.to_string().into())
}

async fn serve_socket(stream: TcpStream) {
    let Ok(socket) = accept_async(stream).await else {
        return;
    };
    let (mut writer, mut reader) = socket.split();
    let (outbox, mut queued) = mpsc::unbounded_channel::<Message>();
    let writer_task = tokio::spawn(async move {
        while let Some(message) = queued.recv().await {
            let closing = matches!(message, Message::Close(_));
            if writer.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    while let Some(Ok(message)) = reader.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        let tool = frame
            .pointer("/params/name")
            .and_then(Value::as_str)
            .map(str::to_owned);
        match tool.as_deref() {
            Some("slow") => {
                let delayed = outbox.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(SLOW_REPLY).await;
                    drop(delayed.send(text_frame(&reply_to(&frame))));
                });
            }
            Some("hangup") => {
                drop(outbox.send(Message::Close(None)));
                break;
            }
            _ => drop(outbox.send(text_frame(&reply_to(&frame)))),
        }
    }
    drop(outbox);
    drop(writer_task.await);
}

/// Bare event-stream server serving a single GET.
///
/// It announces an optional sideband endpoint, then pushes every frame
/// received on its channel as a `message` event. Dropping the channel's
/// sender ends the stream.
pub struct SseServer {
    url: String,
    task: JoinHandle<()>,
}

impl SseServer {
    /// Starts the server; the stream URL is `/sse` on an ephemeral port.
    pub async fn start(
        endpoint: Option<String>,
        frames: mpsc::UnboundedReceiver<Value>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}/sse", listener.local_addr()?);
        let task = tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                serve_stream(stream, endpoint, frames).await;
            }
        });
        Ok(Self { url, task })
    }

    /// Returns the stream URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for SseServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_request_head(stream: &mut TcpStream) -> io::Result<()> {
    let mut head = Vec::new();
    let mut chunk = [0_u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        head.extend_from_slice(chunk.get(..read).unwrap_or_default());
    }
    Ok(())
}

async fn serve_stream(
    mut stream: TcpStream,
    endpoint: Option<String>,
    mut frames: mpsc::UnboundedReceiver<Value>,
) {
    if read_request_head(&mut stream).await.is_err() {
        return;
    }
    let mut preamble = String::from(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\n\r\n",
    );
    if let Some(url) = endpoint {
        preamble.push_str(&format!("event: endpoint\ndata: {url}\n\n"));
    }
    if stream.write_all(preamble.as_bytes()).await.is_err() {
        return;
    }
    while let Some(frame) = frames.recv().await {
        let event = format!("event: message\ndata: {frame}\n\n");
        if stream.write_all(event.as_bytes()).await.is_err() {
            return;
        }
    }
    drop(stream.shutdown().await);
}

/// Returns a URL on a local port nothing listens on.
pub async fn unreachable_url(path: &str) -> io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}{path}"))
}
