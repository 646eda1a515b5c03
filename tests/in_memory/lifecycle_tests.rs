//! Connection lifecycle integration tests over scripted transports.

use super::helpers::{Gateway, descriptor, gateway, owner_credentials, test_config};
use chrono::Utc;
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use toolgate::connection::{
    adapters::memory::{InMemoryServiceDiscovery, ScriptedReply, ScriptedSession},
    domain::{
        AUTHORIZATION_HEADER, AuthRequest, ConnectionState, DiscoveryStatus, OwnerTag,
        TOOLS_CALL_METHOD, TransportKind,
    },
    ports::TransportSession,
    services::CreateConnectionRequest,
};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn hybrid_service_connects_on_first_candidate(gateway: Gateway) {
    gateway.accept_with_tools(TransportKind::StreamableHttp, &["search", "fetch"]);

    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(descriptor(
            "search",
            "https://search.example.com/mcp",
        )))
        .await
        .expect("connection should be established");

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(connection.transport(), Some(TransportKind::StreamableHttp));
    assert_eq!(connection.discovery(), Some(&DiscoveryStatus::Live));
    assert_eq!(connection.tools().names(), vec!["fetch", "search"]);
    assert_eq!(
        gateway.connector.attempted_kinds(),
        vec![TransportKind::StreamableHttp]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn auth_gated_service_without_credentials_makes_no_attempt(gateway: Gateway) {
    gateway.accept_with_tools(TransportKind::WebSocket, &["vault"]);
    let gated = descriptor("vault", "wss://vault.example.com/ws").with_auth_required(true);

    let error = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(gated))
        .await
        .expect_err("credentials are required");

    assert_eq!(error.code(), "AUTH_REQUIRED");
    assert!(gateway.connector.attempts().is_empty());
    assert!(gateway.registry.is_empty().expect("registry readable"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn verified_credentials_are_injected_into_the_handshake(gateway: Gateway) {
    gateway.accept_with_tools(TransportKind::WebSocket, &["vault"]);
    let gated = descriptor("vault", "wss://vault.example.com/ws")
        .with_transports([TransportKind::WebSocket])
        .with_auth_required(true);

    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(gated).with_auth(owner_credentials()))
        .await
        .expect("owner should connect");

    assert_eq!(connection.state(), ConnectionState::Connected);
    let attempts = gateway.connector.attempts();
    let auth = attempts
        .first()
        .and_then(|attempt| attempt.auth.as_ref())
        .expect("handshake should carry credentials");
    assert!(auth.headers().contains(&(
        AUTHORIZATION_HEADER,
        "Bearer static-0xa11ce-7".to_owned()
    )));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn non_owner_is_rejected_before_transport(gateway: Gateway) {
    let gated = descriptor("vault", "wss://vault.example.com/ws").with_auth_required(true);
    let stranger = AuthRequest::new("0xB0B", "0xC0FFEE", "7").expect("valid auth request");

    let error = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(gated).with_auth(stranger))
        .await
        .expect_err("non-owner should be rejected");

    assert_eq!(error.code(), "AUTH_FAILED");
    assert!(gateway.connector.attempts().is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn close_is_idempotent_and_removes_the_connection(gateway: Gateway) {
    let session = gateway.accept_with_tools(TransportKind::Http, &["echo"]);
    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(descriptor(
            "echo",
            "http://echo.example.com",
        )))
        .await
        .expect("connection should be established");

    gateway
        .lifecycle
        .close_connection(connection.id())
        .await
        .expect("first close");
    gateway
        .lifecycle
        .close_connection(connection.id())
        .await
        .expect("second close is a no-op");

    assert!(session.is_closed());
    assert!(
        gateway
            .lifecycle
            .list_connections(None)
            .expect("list")
            .is_empty()
    );
    let lookup = gateway.lifecycle.get_connection(connection.id());
    assert_eq!(
        lookup.expect_err("connection removed").code(),
        "CONNECTION_NOT_FOUND"
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn close_rejects_in_flight_calls_and_leaves_nothing_pending(gateway: Gateway) {
    let session = gateway.accept_with_tools(TransportKind::WebSocket, &["slow"]);
    session.script(TOOLS_CALL_METHOD, ScriptedReply::Silent);
    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(descriptor(
            "slow",
            "wss://slow.example.com",
        )))
        .await
        .expect("connection should be established");
    let id = connection.id();

    let call = gateway
        .invoker
        .execute_tool(id, "slow", json!({}), Some(Duration::from_secs(10)));
    let closer = async {
        while session.correlator().pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        gateway.lifecycle.close_connection(id).await
    };
    let (outcome, closed) = tokio::join!(call, closer);

    closed.expect("close succeeds");
    assert_eq!(
        outcome.expect_err("call is rejected").code(),
        "DISCONNECTED_MID_FLIGHT"
    );
    assert_eq!(session.correlator().pending_count(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn remote_close_marks_connection_disconnected(gateway: Gateway) {
    let session = gateway.accept_with_tools(TransportKind::WebSocket, &["echo"]);
    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(descriptor(
            "echo",
            "wss://echo.example.com",
        )))
        .await
        .expect("connection should be established");

    session.remote_close("server restarting");

    let id = connection.id();
    let mut state = ConnectionState::Connected;
    for _ in 0..100 {
        state = gateway.lifecycle.get_connection(id).expect("registered").state();
        if state == ConnectionState::Disconnected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state, ConnectionState::Disconnected);

    let error = gateway
        .invoker
        .execute_tool(id, "echo", json!({}), None)
        .await
        .expect_err("disconnected connection refuses calls");
    assert_eq!(error.code(), "CONNECTION_NOT_READY");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reconnect_replaces_the_session(gateway: Gateway) {
    let first = gateway.accept_with_tools(TransportKind::Http, &["echo"]);
    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(descriptor(
            "echo",
            "http://echo.example.com",
        )))
        .await
        .expect("connection should be established");
    let second = gateway.accept_with_tools(TransportKind::Http, &["echo", "reverse"]);

    let reconnected = gateway
        .lifecycle
        .reconnect(connection.id())
        .await
        .expect("reconnect succeeds");

    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert_eq!(reconnected.id(), connection.id());
    assert_eq!(reconnected.state(), ConnectionState::Connected);
    assert_eq!(reconnected.tools().names(), vec!["echo", "reverse"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn degraded_discovery_still_connects(gateway: Gateway) {
    let session = ScriptedSession::new(TransportKind::Sse);
    gateway.connector.accept(TransportKind::Sse, Arc::clone(&session));
    let legacy = descriptor("legacy", "https://legacy.example.com/sse")
        .with_transports([TransportKind::Sse]);

    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(legacy))
        .await
        .expect("discovery failure must not fail the connection");

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(connection.is_discovery_degraded());
    assert!(connection.tools().is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn listing_is_scoped_by_owner(gateway: Gateway) {
    gateway.accept_with_tools(TransportKind::Http, &["echo"]);
    let alice = OwnerTag::new("alice").expect("valid owner");
    let bob = OwnerTag::new("bob").expect("valid owner");
    for owner in [&alice, &alice, &bob] {
        gateway
            .lifecycle
            .create_connection(
                CreateConnectionRequest::new(descriptor("echo", "http://echo.example.com"))
                    .with_owner(owner.clone()),
            )
            .await
            .expect("connection should be established");
    }

    let listed = gateway.lifecycle.list_connections(Some(&alice)).expect("list");

    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|connection| connection.owner() == Some(&alice)));
    assert_eq!(gateway.lifecycle.list_connections(None).expect("list").len(), 3);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn connect_service_resolves_through_discovery() {
    let discovery = InMemoryServiceDiscovery::new();
    discovery
        .register(descriptor("weather", "https://weather.example.com/mcp"))
        .expect("register");
    let base = Gateway::with_config(test_config());
    base.accept_with_tools(TransportKind::StreamableHttp, &["forecast"]);
    let lifecycle = base.lifecycle.with_discovery(Arc::new(discovery));

    let connection = lifecycle
        .connect_service("weather", None, None)
        .await
        .expect("known service connects");
    let missing = lifecycle
        .connect_service("unknown", None, None)
        .await
        .expect_err("unknown service");

    assert_eq!(connection.tools().names(), vec!["forecast"]);
    assert_eq!(missing.code(), "SERVICE_NOT_FOUND");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn idle_connections_are_evicted_and_shutdown_closes_the_rest(gateway: Gateway) {
    let session = gateway.accept_with_tools(TransportKind::Http, &["echo"]);
    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(descriptor(
            "echo",
            "http://echo.example.com",
        )))
        .await
        .expect("connection should be established");

    let too_early = gateway
        .lifecycle
        .evict_idle(Utc::now())
        .await
        .expect("eviction");
    assert!(too_early.is_empty());

    let later = Utc::now() + chrono::Duration::hours(1);
    let evicted = gateway.lifecycle.evict_idle(later).await.expect("eviction");
    assert_eq!(evicted, vec![connection.id()]);
    assert!(session.is_closed());
    assert_eq!(gateway.lifecycle.shutdown().await.expect("shutdown"), 0);
}
