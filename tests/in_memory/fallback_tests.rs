//! Transport fallback integration tests.

use super::helpers::{Gateway, descriptor, gateway};
use rstest::rstest;
use toolgate::connection::{
    domain::{ConnectionState, TransportKind},
    ports::TransportError,
    services::{CreateConnectionRequest, GatewayError},
};

fn refuse(gateway: &Gateway, kinds: &[TransportKind]) {
    for kind in kinds {
        gateway.connector.reject(
            *kind,
            TransportError::Connect {
                endpoint: "https://tools.example.com/".to_owned(),
                reason: "connection refused".to_owned(),
            },
        );
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn last_candidate_succeeds_after_three_failures(gateway: Gateway) {
    refuse(
        &gateway,
        &[
            TransportKind::StreamableHttp,
            TransportKind::WebSocket,
            TransportKind::Sse,
        ],
    );
    gateway.accept_with_tools(TransportKind::Http, &["echo"]);

    let connection = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(descriptor(
            "echo",
            "https://tools.example.com",
        )))
        .await
        .expect("stateless HTTP should succeed");

    assert_eq!(connection.transport(), Some(TransportKind::Http));
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(
        gateway.connector.attempted_kinds(),
        TransportKind::PRIORITY.to_vec()
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn exhaustion_reports_every_attempt_in_order(gateway: Gateway) {
    refuse(&gateway, &TransportKind::PRIORITY);

    let error = gateway
        .lifecycle
        .create_connection(CreateConnectionRequest::new(descriptor(
            "down",
            "https://down.example.com",
        )))
        .await
        .expect_err("every transport fails");

    assert_eq!(error.code(), "CONNECTION_FAILED");
    let GatewayError::ConnectionFailed { failures, .. } = &error else {
        panic!("expected aggregate failure, got {error:?}");
    };
    let attempted: Vec<TransportKind> = failures.iter().map(|failure| failure.kind).collect();
    assert_eq!(attempted, TransportKind::PRIORITY.to_vec());

    let details = error.details().expect("attempt details");
    let attempts = details
        .get("attempts")
        .and_then(|value| value.as_array())
        .expect("attempt list");
    assert_eq!(attempts.len(), 4);
    assert!(
        attempts
            .iter()
            .all(|attempt| attempt["code"] == "TRANSPORT_CANDIDATE_FAILED")
    );
    assert!(
        gateway
            .lifecycle
            .list_connections(None)
            .expect("list")
            .is_empty()
    );
}

#[rstest]
#[case::declared_order(
    vec![TransportKind::Http, TransportKind::WebSocket],
    None,
    vec![TransportKind::WebSocket, TransportKind::Http]
)]
#[case::pinned_by_descriptor(vec![TransportKind::Sse], None, vec![TransportKind::Sse])]
#[case::requested_wins(
    vec![TransportKind::WebSocket],
    Some(TransportKind::Http),
    vec![TransportKind::Http]
)]
#[tokio::test(flavor = "multi_thread")]
async fn candidates_follow_declared_pinned_and_requested_kinds(
    gateway: Gateway,
    #[case] declared: Vec<TransportKind>,
    #[case] requested: Option<TransportKind>,
    #[case] expected: Vec<TransportKind>,
) {
    refuse(&gateway, &TransportKind::PRIORITY);
    let service = descriptor("svc", "https://svc.example.com").with_transports(declared);
    let request = match requested {
        Some(kind) => CreateConnectionRequest::new(service).with_transport(kind),
        None => CreateConnectionRequest::new(service),
    };

    let result = gateway.lifecycle.create_connection(request).await;

    assert!(result.is_err());
    assert_eq!(gateway.connector.attempted_kinds(), expected);
}
