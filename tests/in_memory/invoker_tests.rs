//! Tool invocation integration tests over scripted transports.

use super::helpers::{Gateway, descriptor, gateway, test_config};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use toolgate::connection::{
    adapters::{
        known_schema::StaticKnownSchemaRegistry,
        memory::{ScriptedReply, ScriptedSession},
    },
    domain::{
        ConnectionId, ConnectionState, DiscoveryStatus, RpcError, TOOLS_CALL_METHOD,
        TOOLS_LIST_METHOD, ToolDefinition, TransportKind,
    },
    ports::{TransportError, TransportSession},
    services::CreateConnectionRequest,
};

async fn connect(gateway: &Gateway, kind: TransportKind, tools: &[&str]) -> ConnectionId {
    gateway.accept_with_tools(kind, tools);
    let service = descriptor("tools", "https://tools.example.com/mcp").with_transports([kind]);
    gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(service))
        .await
        .expect("connection should be established")
        .id()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn echo_call_returns_the_remote_result(gateway: Gateway) {
    let session = gateway.accept_with_tools(TransportKind::StreamableHttp, &["echo"]);
    session.script(
        TOOLS_CALL_METHOD,
        ScriptedReply::Result(json!({"content": [{"type": "text", "text": "hi"}]})),
    );
    let service = descriptor("echo", "https://echo.example.com/mcp");
    let id = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(service))
        .await
        .expect("connection should be established")
        .id();

    let envelope = gateway
        .invoker
        .execute(id, "echo", json!({"text": "hi"}), None)
        .await;

    assert!(envelope.error().is_none());
    let result = envelope.result().expect("call succeeds");
    assert_eq!(result["content"][0]["text"], "hi");
    let sent = session.sent();
    let call = sent
        .iter()
        .find(|request| request.method == TOOLS_CALL_METHOD)
        .expect("tools/call transmitted");
    assert_eq!(call.params["name"], "echo");
    assert_eq!(call.params["arguments"]["text"], "hi");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn call_timeout_is_independent_of_connection_health(gateway: Gateway) {
    let session = gateway.accept_with_tools(TransportKind::WebSocket, &["slow"]);
    session.script(TOOLS_CALL_METHOD, ScriptedReply::Silent);
    session.script(
        TOOLS_CALL_METHOD,
        ScriptedReply::Result(json!({"content": [{"type": "text", "text": "done"}]})),
    );
    let service = descriptor("slow", "wss://slow.example.com/ws")
        .with_transports([TransportKind::WebSocket]);
    let id = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(service))
        .await
        .expect("connection should be established")
        .id();

    let first = gateway
        .invoker
        .execute_tool(id, "slow", json!({}), Some(Duration::from_millis(30)))
        .await
        .expect_err("first call times out");
    assert_eq!(first.code(), "TIMEOUT");
    assert_eq!(session.correlator().pending_count(), 0);

    let connection = gateway.lifecycle.get_connection(id).expect("still registered");
    assert_eq!(connection.state(), ConnectionState::Connected);

    let second = gateway
        .invoker
        .execute_tool(id, "slow", json!({}), None)
        .await
        .expect("second call succeeds");
    assert_eq!(second["content"][0]["text"], "done");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn envelope_carries_exactly_one_outcome(gateway: Gateway) {
    let session = gateway.accept_with_tools(TransportKind::Http, &["echo", "fail"]);
    session.script(
        TOOLS_CALL_METHOD,
        ScriptedReply::Result(json!({"content": [{"type": "text", "text": "ok"}]})),
    );
    session.script(
        TOOLS_CALL_METHOD,
        ScriptedReply::Error(RpcError {
            code: -32_602,
            message: "bad arguments".to_owned(),
            data: None,
        }),
    );
    let service =
        descriptor("echo", "http://echo.example.com").with_transports([TransportKind::Http]);
    let id = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(service))
        .await
        .expect("connection should be established")
        .id();

    let success = gateway.invoker.execute(id, "echo", json!({}), None).await;
    let failure = gateway.invoker.execute(id, "fail", json!({}), None).await;

    assert!(success.result().is_some() && success.error().is_none());
    assert!(failure.result().is_none());
    let error = failure.error().expect("remote failure");
    assert_eq!(error.code, "REMOTE_TOOL_ERROR");
    assert!(error.message.contains("bad arguments"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_tool_lists_available_names(gateway: Gateway) {
    let id = connect(&gateway, TransportKind::Http, &["search", "fetch"]).await;

    let error = gateway
        .invoker
        .execute_tool(id, "delete", json!({}), None)
        .await
        .expect_err("tool is not advertised");

    assert_eq!(error.code(), "TOOL_NOT_FOUND");
    let details = error.details().expect("tool details");
    assert_eq!(details["available_tools"], json!(["fetch", "search"]));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_connection_is_reported(gateway: Gateway) {
    let error = gateway
        .invoker
        .execute_tool(ConnectionId::new(), "echo", json!({}), None)
        .await
        .expect_err("no such connection");

    assert_eq!(error.code(), "CONNECTION_NOT_FOUND");
}

#[rstest]
#[case::array(json!([1, 2]))]
#[case::string(json!("text"))]
#[tokio::test(flavor = "multi_thread")]
async fn non_object_parameters_are_rejected(
    gateway: Gateway,
    #[case] parameters: serde_json::Value,
) {
    let id = connect(&gateway, TransportKind::Http, &["echo"]).await;

    let error = gateway
        .invoker
        .execute_tool(id, "echo", parameters, None)
        .await
        .expect_err("parameters must be an object");

    assert_eq!(error.code(), "VALIDATION_ERROR");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sideband_only_service_uses_known_schemas_and_reports_execution_unavailable() {
    let unavailable = || {
        ScriptedReply::Fail(TransportError::ExecutionUnavailable(
            "sideband http://127.0.0.1:9/messages: unreachable".to_owned(),
        ))
    };
    let session = ScriptedSession::new(TransportKind::Sse);
    session.script(TOOLS_LIST_METHOD, unavailable());
    session.script(TOOLS_CALL_METHOD, unavailable());
    let service = descriptor("legacy", "https://legacy.example.com/sse")
        .with_transports([TransportKind::Sse]);
    let known = StaticKnownSchemaRegistry::new().with_service(
        service.id().clone(),
        vec![ToolDefinition::new("lookup").expect("valid tool")],
    );
    let gateway = Gateway::with_config(test_config()).with_known_schemas(Arc::new(known));
    gateway
        .connector
        .accept(TransportKind::Sse, Arc::clone(&session));

    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(service))
        .await
        .expect("push stream alone is enough to connect");
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(matches!(
        connection.discovery(),
        Some(DiscoveryStatus::KnownSchema { .. })
    ));
    assert_eq!(connection.tools().names(), vec!["lookup"]);

    let error = gateway
        .invoker
        .execute_tool(connection.id(), "lookup", json!({"q": "x"}), None)
        .await
        .expect_err("sideband is unreachable");

    assert_eq!(error.code(), "TRANSPORT_EXECUTION_UNAVAILABLE");
    let after = gateway
        .lifecycle
        .get_connection(connection.id())
        .expect("still registered");
    assert_eq!(after.state(), ConnectionState::Connected);
}
