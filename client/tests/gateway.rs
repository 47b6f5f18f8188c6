//! Gateway behavior: readiness gating, bearer-token freshness, and the
//! once-only authorization-loss reaction.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::FakeProvider;
use parley_client::{ClientError, Gateway};
use parley_types::SessionState;

fn ok_json() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true }))
}

#[tokio::test]
async fn requests_wait_for_session_restoration() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ok_json()).mount(&server).await;

    let provider = FakeProvider::restoring();
    let gateway = Gateway::builder(server.uri())
        .provider(provider.clone())
        .build()
        .unwrap();

    let pending = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.get("/api/projects").await })
    };

    // Give the request every chance to (incorrectly) go out early.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!gateway.is_ready());
    assert!(
        server.received_requests().await.unwrap().is_empty(),
        "no request may reach the network before restoration completes"
    );

    provider.settle(SessionState::Anonymous);
    pending.await.unwrap().unwrap();
    assert!(gateway.is_ready());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn anonymous_session_sends_no_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ok_json()).mount(&server).await;

    let provider = FakeProvider::anonymous();
    let gateway = Gateway::builder(server.uri())
        .provider(provider.clone())
        .build()
        .unwrap();

    gateway.get("/api/projects").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(
        !requests[0].headers.contains_key("authorization"),
        "anonymous requests must carry no Authorization header"
    );
    assert_eq!(provider.token_fetches(), 0);
}

#[tokio::test]
async fn unconfigured_gateway_is_ready_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ok_json()).mount(&server).await;

    let gateway = Gateway::builder(server.uri()).build().unwrap();
    gateway.get("/api/health").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn each_request_carries_a_freshly_fetched_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ok_json())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ok_json())
        .expect(1)
        .mount(&server)
        .await;

    let provider = FakeProvider::authenticated();
    let gateway = Gateway::builder(server.uri())
        .provider(provider.clone())
        .build()
        .unwrap();

    // Back-to-back requests: each performs its own fetch, nothing is
    // cached across requests.
    gateway.get("/api/projects").await.unwrap();
    gateway.get("/api/projects").await.unwrap();
    assert_eq!(provider.token_fetches(), 2);
}

#[tokio::test]
async fn concurrent_401s_sign_out_and_redirect_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(
            serde_json::json!({ "detail": "Invalid Firebase token" }),
        ))
        .mount(&server)
        .await;

    let provider = FakeProvider::authenticated();
    let redirects = Arc::new(AtomicUsize::new(0));
    let gateway = {
        let redirects = Arc::clone(&redirects);
        Gateway::builder(server.uri())
            .provider(provider.clone())
            .on_auth_lost(move || {
                redirects.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap()
    };

    let (a, b, c) = tokio::join!(
        gateway.get("/api/projects"),
        gateway.get("/api/projects"),
        gateway.get("/api/auth/me"),
    );
    for result in [a, b, c] {
        assert!(matches!(result, Err(ClientError::AuthorizationLost)));
    }

    assert_eq!(provider.sign_outs(), 1, "exactly one sign-out");
    assert_eq!(redirects.load(Ordering::SeqCst), 1, "exactly one redirect");
}

#[tokio::test]
async fn login_then_request_carries_the_new_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ok_json())
        .expect(1)
        .mount(&server)
        .await;

    let provider = FakeProvider::anonymous();
    let gateway = Gateway::builder(server.uri())
        .provider(provider.clone())
        .build()
        .unwrap();

    use parley_auth::IdentityProvider as _;
    provider.sign_in("a@b.com", "pw").await.unwrap();
    gateway.get("/api/auth/me").await.unwrap();
}

#[tokio::test]
async fn non_auth_errors_propagate_with_backend_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({ "detail": "Project not found" })),
        )
        .mount(&server)
        .await;

    let provider = FakeProvider::anonymous();
    let gateway = Gateway::builder(server.uri())
        .provider(provider.clone())
        .build()
        .unwrap();

    let err = gateway.get("/api/projects/nope").await.unwrap_err();
    match err {
        ClientError::Api { status, detail } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(detail, "Project not found");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert_eq!(provider.sign_outs(), 0, "only 401 triggers the reaction");
}

#[tokio::test]
async fn configured_ready_timeout_fails_the_request_outright() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ok_json()).mount(&server).await;

    let provider = FakeProvider::restoring(); // never settles
    let gateway = Gateway::builder(server.uri())
        .provider(provider)
        .ready_timeout(Some(Duration::from_millis(50)))
        .build()
        .unwrap();

    let err = gateway.get("/api/projects").await.unwrap_err();
    assert!(matches!(err, ClientError::ReadinessTimeout(_)));
    assert!(
        server.received_requests().await.unwrap().is_empty(),
        "a timed-out request must never have been sent"
    );
}

#[tokio::test]
async fn gate_stays_closed_while_provider_is_still_restoring() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ok_json()).mount(&server).await;

    let provider = FakeProvider::restoring();
    let gateway = Gateway::builder(server.uri())
        .provider(provider.clone())
        .build()
        .unwrap();

    // Dropping the test handle must not resolve the gate: the gateway holds
    // its own provider handle and the state channel is still open.
    drop(provider);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!gateway.is_ready());
}
