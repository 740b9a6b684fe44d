// Inspector access gate and actions: token precedence, constant-time
// comparison outcomes, credential provisioning, prune and replay.
use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::prelude::{BASE64_STANDARD, Engine as _};
use chrono::Utc;
use http_body_util::BodyExt;
use tokio::sync::mpsc;
use warren::{
    adapters::{Inspector, MemoryCredentialStore, MemoryLogStore},
    config::models::{DispatchConfig, InspectorConfig, RecorderConfig},
    core::{
        Dispatcher, PeerRegistry, Recorder, ReplayEngine,
        frame::{ControlFrame, FrameHeaders},
        peer::Peer,
    },
    ports::{
        credential_store::CredentialStore,
        log_store::{LogStore, NewRequestLog},
    },
};

struct Fixture {
    inspector: Inspector,
    store: Arc<MemoryLogStore>,
    registry: Arc<PeerRegistry>,
}

async fn fixture_with_password(hostname: &str, password: Option<&str>) -> Fixture {
    let store = Arc::new(MemoryLogStore::new());
    let credentials = Arc::new(MemoryCredentialStore::new());
    if let Some(password) = password {
        credentials.upsert(hostname, password).await.unwrap();
    }

    let registry = Arc::new(PeerRegistry::new());
    let recorder = Recorder::spawn(store.clone(), &RecorderConfig::default());
    let dispatcher = Arc::new(Dispatcher::new(recorder.clone(), &DispatchConfig::default()));
    let replay = Arc::new(ReplayEngine::new(
        registry.clone(),
        dispatcher,
        store.clone() as Arc<dyn LogStore>,
        recorder,
        Duration::from_secs(5),
    ));

    let inspector = Inspector::new(
        store.clone() as Arc<dyn LogStore>,
        credentials as Arc<dyn CredentialStore>,
        replay,
        InspectorConfig::default(),
    );
    Fixture {
        inspector,
        store,
        registry,
    }
}

fn get(host: &str, path_and_query: &str) -> Request<Body> {
    Request::builder()
        .uri(path_and_query)
        .header(header::HOST, host)
        .body(Body::empty())
        .unwrap()
}

fn post_form(host: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/_warren/inspector")
        .header(header::HOST, host)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

async fn json_body(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn seed_row(hostname: &str) -> NewRequestLog {
    NewRequestLog {
        hostname: hostname.to_string(),
        path: "/x".to_string(),
        method: "POST".to_string(),
        request_headers: r#"{"Content-Type":"application/json"}"#.to_string(),
        request_body: BASE64_STANDARD.encode(b"{}"),
        response_status: Some(200),
        response_headers: "{}".to_string(),
        response_body: BASE64_STANDARD.encode(b"ok"),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn query_token_grants_access() {
    let fx = fixture_with_password("a.example", Some("s3cret")).await;
    let response = fx
        .inspector
        .handle_request(get("a.example", "/_warren/inspector?token=s3cret"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let fx = fixture_with_password("a.example", Some("s3cret")).await;
    let response = fx
        .inspector
        .handle_request(get("a.example", "/_warren/inspector?token=wrong"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn basic_auth_password_segment_grants_access() {
    let fx = fixture_with_password("a.example", Some("s3cret")).await;
    let encoded = BASE64_STANDARD.encode(b"u:s3cret");
    let request = Request::builder()
        .uri("/_warren/inspector")
        .header(header::HOST, "a.example")
        .header(header::AUTHORIZATION, format!("Basic {encoded}"))
        .body(Body::empty())
        .unwrap();
    let response = fx.inspector.handle_request(request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn bearer_token_grants_access() {
    let fx = fixture_with_password("a.example", Some("s3cret")).await;
    let request = Request::builder()
        .uri("/_warren/inspector")
        .header(header::HOST, "a.example")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let response = fx.inspector.handle_request(request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let fx = fixture_with_password("a.example", Some("s3cret")).await;
    let response = fx
        .inspector
        .handle_request(get("a.example", "/_warren/inspector"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unprovisioned_hostname_is_not_found_with_hint() {
    let fx = fixture_with_password("a.example", None).await;
    let response = fx
        .inspector
        .handle_request(get("a.example", "/_warren/inspector?token=anything"))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("a.example"));
    assert!(text.contains("provision"));
}

#[tokio::test]
async fn view_lists_recent_logs_newest_first_with_limit() {
    let fx = fixture_with_password("a.example", Some("s3cret")).await;
    for i in 0..5 {
        let mut row = seed_row("a.example");
        row.path = format!("/req-{i}");
        fx.store.insert(row).await.unwrap();
    }

    let response = fx
        .inspector
        .handle_request(get("a.example", "/_warren/inspector?token=s3cret&limit=3"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = json_body(response).await;
    let logs = view["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0]["path"], "/req-4");
}

#[tokio::test]
async fn form_token_authorizes_prune_action() {
    let fx = fixture_with_password("a.example", Some("s3cret")).await;
    fx.store.insert(seed_row("a.example")).await.unwrap();
    fx.store.insert(seed_row("a.example")).await.unwrap();
    fx.store.insert(seed_row("b.example")).await.unwrap();

    let response = fx
        .inspector
        .handle_request(post_form("a.example", "token=s3cret&action=prune"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = json_body(response).await;
    assert_eq!(view["flash"], "Pruned 2 log entries");

    // Other hostnames untouched.
    assert_eq!(
        fx.store
            .find_recent_by_hostname("b.example", 10)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn replay_action_reports_the_summary() {
    let fx = fixture_with_password("a.example", Some("s3cret")).await;
    let row = fx.store.insert(seed_row("a.example")).await.unwrap();

    // Bind a peer that answers 201 to the replayed request.
    let (peer, mut outbound): (Arc<Peer>, mpsc::Receiver<ControlFrame>) =
        Peer::new("a.example".to_string(), "203.0.113.9".parse().unwrap());
    fx.registry.bind("a.example", peer.clone()).await;
    tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let ControlFrame::ForwardedRequest { request_id, .. } = frame {
                peer.deliver(ControlFrame::ForwardedResponse {
                    request_id,
                    status_code: 201,
                    headers: FrameHeaders::new(),
                    body_b64: String::new(),
                });
            }
        }
    });

    let response = fx
        .inspector
        .handle_request(post_form(
            "a.example",
            &format!("token=s3cret&action=replay&logId={}", row.id),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = json_body(response).await;
    assert_eq!(view["flash"], "Replayed POST /x (status 201)");
}

#[tokio::test]
async fn replay_without_peer_flashes_the_failure() {
    let fx = fixture_with_password("a.example", Some("s3cret")).await;
    let row = fx.store.insert(seed_row("a.example")).await.unwrap();

    let response = fx
        .inspector
        .handle_request(post_form(
            "a.example",
            &format!("token=s3cret&action=replay&logId={}", row.id),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = json_body(response).await;
    let flash = view["flash"].as_str().unwrap();
    assert!(flash.starts_with("Replay failed"));
}

#[tokio::test]
async fn unknown_action_flashes_an_error() {
    let fx = fixture_with_password("a.example", Some("s3cret")).await;
    let response = fx
        .inspector
        .handle_request(post_form("a.example", "token=s3cret&action=explode"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = json_body(response).await;
    assert_eq!(view["flash"], "Unknown action \"explode\"");
}
