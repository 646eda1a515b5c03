//! Persistent WebSocket sessions.

use super::helpers::{NetworkGateway, descriptor};
use super::servers::{SLOW_REPLY, WebSocketServer};
use serde_json::json;
use std::time::Duration;
use toolgate::connection::{
    domain::{ConnectionId, ConnectionState, TransportKind},
    services::CreateConnectionRequest,
};

async fn connect(gateway: &NetworkGateway, server: &WebSocketServer) -> ConnectionId {
    let service = descriptor("socket", server.url()).with_transports([TransportKind::WebSocket]);
    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(service))
        .await
        .expect("socket should connect");
    assert_eq!(connection.transport(), Some(TransportKind::WebSocket));
    connection.id()
}

#[tokio::test(flavor = "multi_thread")]
async fn call_deadline_does_not_disturb_the_socket() {
    let server = WebSocketServer::start().await.expect("server starts");
    let gateway = NetworkGateway::new();
    let id = connect(&gateway, &server).await;

    let timed_out = gateway
        .invoker
        .execute_tool(id, "slow", json!({}), Some(Duration::from_millis(50)))
        .await
        .expect_err("slow tool exceeds the deadline");
    assert_eq!(timed_out.code(), "TIMEOUT");

    let echoed = gateway
        .invoker
        .execute_tool(id, "echo", json!({"text": "still here"}), None)
        .await
        .expect("next call succeeds");
    assert_eq!(echoed["content"][0]["text"], "still here");

    tokio::time::sleep(SLOW_REPLY).await;
    let after_late_reply = gateway
        .invoker
        .execute_tool(id, "echo", json!({"text": "again"}), None)
        .await
        .expect("late reply is discarded");
    assert_eq!(after_late_reply["content"][0]["text"], "again");
    assert_eq!(
        gateway.lifecycle.get_connection(id).expect("registered").state(),
        ConnectionState::Connected
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_close_fails_in_flight_call_and_disconnects() {
    let server = WebSocketServer::start().await.expect("server starts");
    let gateway = NetworkGateway::new();
    let id = connect(&gateway, &server).await;

    let error = gateway
        .invoker
        .execute_tool(id, "hangup", json!({}), None)
        .await
        .expect_err("server closes instead of answering");

    assert_eq!(error.code(), "DISCONNECTED_MID_FLIGHT");
    assert_eq!(
        gateway.wait_for_state(id, ConnectionState::Disconnected).await,
        ConnectionState::Disconnected
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_socket_does_not_affect_other_connections() {
    let server = WebSocketServer::start().await.expect("server starts");
    let gateway = NetworkGateway::new();
    let unreachable = descriptor("socket", "ws://127.0.0.1:1/ws")
        .with_transports([TransportKind::WebSocket]);

    let error = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(unreachable))
        .await
        .expect_err("nothing listens on port 1");
    let id = connect(&gateway, &server).await;

    assert_eq!(error.code(), "CONNECTION_FAILED");
    assert!(gateway.lifecycle.get_connection(id).is_ok());
}
