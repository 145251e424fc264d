//! End-to-end refresh flow against a mock backend.
//!
//! Verifies single-flight refresh, replay, and session termination over real
//! HTTP.

use std::sync::Arc;
use std::time::Duration;

use authlane_core::config::Config;
use authlane_core::http::{HttpTransport, StatusCode};
use authlane_core::refresh::{HttpTokenRefresher, TokenRefresher};
use authlane_core::session::{
    ACCESS_TOKEN_KEY, IDENTITY_KEY, MemoryStore, REFRESH_TOKEN_KEY, StoreTerminator,
};
use authlane_core::{
    ApiRequest, AuthError, AuthStatus, AuthenticatedClient, RefreshError, SessionStore,
    TransportErrorKind,
};
use serde_json::json;
use tokio::sync::watch;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

struct Session {
    client: AuthenticatedClient,
    store: Arc<MemoryStore>,
    status: watch::Receiver<AuthStatus>,
}

fn session_against(server: &MockServer, store: MemoryStore) -> Session {
    let store = Arc::new(store);
    let (terminator, status) = StoreTerminator::new(Arc::clone(&store) as Arc<dyn SessionStore>);

    let base = Url::parse(&format!("{}/api/", server.uri())).unwrap();
    let http = reqwest::Client::new();
    let transport = HttpTransport::new(http.clone(), base.clone());
    let refresher = HttpTokenRefresher::new(http, base.join("token/refresh/").unwrap());

    let client = AuthenticatedClient::new(
        Arc::new(transport),
        Arc::clone(&store) as Arc<dyn SessionStore>,
        Arc::new(refresher),
        Arc::new(terminator),
    );
    Session {
        client,
        store,
        status,
    }
}

fn expired_session() -> MemoryStore {
    MemoryStore::with_values([
        (ACCESS_TOKEN_KEY, "T1"),
        (REFRESH_TOKEN_KEY, "R1"),
        (IDENTITY_KEY, "ana"),
    ])
}

async fn mount_expired_token(server: &MockServer) {
    Mock::given(header("Authorization", "Bearer T1"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Given token not valid for any token type"})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_concurrent_401s_trigger_one_refresh() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    mount_expired_token(&server).await;

    for endpoint in ["/api/library/", "/api/cart/", "/api/games/"] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(header("Authorization", "Bearer T2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"endpoint": endpoint})))
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .and(body_json(json!({"refresh": "R1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "T2"}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = session_against(&server, expired_session());

    let handles: Vec<_> = ["library/", "cart/", "games/"]
        .into_iter()
        .map(|p| {
            let client = session.client.clone();
            tokio::spawn(async move { client.send(ApiRequest::get(p)).await })
        })
        .collect();

    for (handle, p) in handles.into_iter().zip(["library/", "cart/", "games/"]) {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.status, StatusCode::OK);
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["endpoint"], format!("/api/{p}"));
    }

    assert_eq!(session.store.get(ACCESS_TOKEN_KEY).as_deref(), Some("T2"));
    assert_eq!(session.store.get(REFRESH_TOKEN_KEY).as_deref(), Some("R1"));
    assert_eq!(*session.status.borrow(), AuthStatus::Authenticated);
}

#[tokio::test]
async fn test_replay_preserves_method_and_body() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    mount_expired_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/cart/"))
        .and(header("Authorization", "Bearer T2"))
        .and(body_json(json!({"game_id": 7, "quantity": 1})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 42})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "T2", "refresh": "R2"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_against(&server, expired_session());
    let response = session
        .client
        .send(ApiRequest::post("cart/", json!({"game_id": 7, "quantity": 1})))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(session.store.get(REFRESH_TOKEN_KEY).as_deref(), Some("R2"));
}

#[tokio::test]
async fn test_rejected_refresh_logs_out() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    mount_expired_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Token is invalid or expired"}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = session_against(&server, expired_session());

    let handles: Vec<_> = ["library/", "cart/"]
        .into_iter()
        .map(|p| {
            let client = session.client.clone();
            tokio::spawn(async move { client.send(ApiRequest::get(p)).await })
        })
        .collect();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_session_ending(), "unexpected error: {err}");
    }

    for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, IDENTITY_KEY] {
        assert_eq!(session.store.get(key), None, "{key} should be cleared");
    }
    assert_eq!(*session.status.borrow(), AuthStatus::LoggedOut);
    assert!(!session.client.is_refreshing());
}

#[tokio::test]
async fn test_missing_refresh_token_logs_out_without_refresh() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    mount_expired_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "T2"})))
        .expect(0)
        .mount(&server)
        .await;

    let session = session_against(
        &server,
        MemoryStore::with_values([(ACCESS_TOKEN_KEY, "T1"), (IDENTITY_KEY, "ana")]),
    );

    let err = session
        .client
        .send(ApiRequest::get("library/"))
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::NoRefreshToken);
    assert_eq!(session.store.get(IDENTITY_KEY), None);
    assert_eq!(*session.status.borrow(), AuthStatus::LoggedOut);
}

#[tokio::test]
async fn test_non_auth_failure_passes_through() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/games/999/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "T2"})))
        .expect(0)
        .mount(&server)
        .await;

    let session = session_against(&server, expired_session());
    let response = session
        .client
        .send(ApiRequest::get("games/999/"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(session.store.get(ACCESS_TOKEN_KEY).as_deref(), Some("T1"));
    assert_eq!(*session.status.borrow(), AuthStatus::Authenticated);
}

#[tokio::test]
async fn test_malformed_refresh_body_is_a_parse_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let endpoint = Url::parse(&format!("{}/api/token/refresh/", server.uri())).unwrap();
    let refresher = HttpTokenRefresher::new(reqwest::Client::new(), endpoint);

    let err = refresher.refresh("R1").await.unwrap_err();
    assert!(matches!(err, RefreshError::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unreachable_backend_is_a_transport_error() {
    let port = {
        let Ok(listener) = std::net::TcpListener::bind("127.0.0.1:0") else {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        };
        listener.local_addr().unwrap().port()
    };

    let config = Config {
        base_url: format!("http://127.0.0.1:{port}/api/"),
        request_timeout_secs: 5,
        ..Config::default()
    };
    if std::env::var(authlane_core::config::BASE_URL_ENV).is_ok() {
        return;
    }

    let store = Arc::new(expired_session());
    let (terminator, status) = StoreTerminator::new(Arc::clone(&store) as Arc<dyn SessionStore>);
    let client = AuthenticatedClient::from_config(
        &config,
        Arc::clone(&store) as Arc<dyn SessionStore>,
        Arc::new(terminator),
    )
    .unwrap();

    let err = client.send(ApiRequest::get("library/")).await.unwrap_err();

    match err {
        AuthError::Transport(err) => assert_eq!(err.kind, TransportErrorKind::Connect),
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(*status.borrow(), AuthStatus::Authenticated);
}
