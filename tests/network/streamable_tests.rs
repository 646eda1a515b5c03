//! Hybrid streamable HTTP sessions.

use super::helpers::{NetworkGateway, descriptor, loopback_config};
use super::servers::RpcResponder;
use serde_json::json;
use std::time::Duration;
use toolgate::connection::{
    adapters::transport::SESSION_ID_HEADER,
    domain::{ConnectionState, DiscoveryStatus, TransportKind},
    services::CreateConnectionRequest,
};
use wiremock::matchers::{body_partial_json, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn without_push_stream(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(405))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn session_id_is_carried_until_close() {
    let server = MockServer::start().await;
    without_push_stream(&server).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/call"})))
        .and(header(SESSION_ID_HEADER, "sess-1"))
        .respond_with(RpcResponder::json())
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(RpcResponder::json().with_session_id("sess-1"))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(header(SESSION_ID_HEADER, "sess-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let gateway = NetworkGateway::new();

    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(descriptor(
            "search",
            &format!("{}/mcp", server.uri()),
        )))
        .await
        .expect("streamable session should connect");
    assert_eq!(connection.transport(), Some(TransportKind::StreamableHttp));
    assert_eq!(connection.discovery(), Some(&DiscoveryStatus::Live));
    assert_eq!(connection.tools().names(), vec!["echo", "hangup", "slow"]);

    let result = gateway
        .invoker
        .execute_tool(connection.id(), "echo", json!({"text": "hello"}), None)
        .await
        .expect("call should succeed");
    assert_eq!(result["content"][0]["text"], "hello");

    gateway
        .lifecycle
        .close_connection(connection.id())
        .await
        .expect("close");
    server.verify().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn event_stream_replies_are_decoded() {
    let server = MockServer::start().await;
    without_push_stream(&server).await;
    Mock::given(method("POST"))
        .respond_with(RpcResponder::event_stream())
        .mount(&server)
        .await;
    let gateway = NetworkGateway::new();

    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(descriptor(
            "search",
            &format!("{}/mcp", server.uri()),
        )))
        .await
        .expect("streamable session should connect");
    let envelope = gateway
        .invoker
        .execute(connection.id(), "echo", json!({"text": "streamed"}), None)
        .await;

    assert_eq!(connection.state(), ConnectionState::Connected);
    let result = envelope.result().expect("call should succeed");
    assert_eq!(result["content"][0]["text"], "streamed");
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_status_is_reported_as_transport_error() {
    let server = MockServer::start().await;
    without_push_stream(&server).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/call"})))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(RpcResponder::json())
        .mount(&server)
        .await;
    let gateway = NetworkGateway::new();
    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(descriptor(
            "search",
            &format!("{}/mcp", server.uri()),
        )))
        .await
        .expect("streamable session should connect");

    let error = gateway
        .invoker
        .execute_tool(connection.id(), "echo", json!({}), None)
        .await
        .expect_err("server fails the call");

    assert_eq!(error.code(), "TRANSPORT_ERROR");
    assert!(error.to_string().contains("500"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_session_answer_disconnects_the_connection() {
    let server = MockServer::start().await;
    without_push_stream(&server).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/call"})))
        .and(header(SESSION_ID_HEADER, "sess-9"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(RpcResponder::json().with_session_id("sess-9"))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let gateway = NetworkGateway::new();
    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(descriptor(
            "search",
            &format!("{}/mcp", server.uri()),
        )))
        .await
        .expect("streamable session should connect");

    let error = gateway
        .invoker
        .execute_tool(connection.id(), "echo", json!({}), None)
        .await
        .expect_err("server no longer knows the session");

    assert_eq!(error.code(), "DISCONNECTED_MID_FLIGHT");
    assert!(error.to_string().contains("sess-9"));
    assert_eq!(
        gateway
            .wait_for_state(connection.id(), ConnectionState::Disconnected)
            .await,
        ConnectionState::Disconnected
    );
    gateway
        .lifecycle
        .close_connection(connection.id())
        .await
        .expect("close");
    server.verify().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_ping_cannot_exhaust_the_candidate_deadline() {
    let server = MockServer::start().await;
    without_push_stream(&server).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "ping"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {}}))
                .set_delay(Duration::from_secs(3)),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(RpcResponder::json())
        .mount(&server)
        .await;
    let config = loopback_config()
        .with_connect_timeout(Duration::from_millis(800))
        .with_probe_timeout(Duration::from_secs(5));
    let gateway = NetworkGateway::with_config(config);
    let service = descriptor("search", &format!("{}/mcp", server.uri()))
        .with_transports([TransportKind::StreamableHttp]);

    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(service))
        .await
        .expect("unanswered ping keeps the session");

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(connection.transport(), Some(TransportKind::StreamableHttp));
}
