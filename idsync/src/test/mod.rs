//! End-to-end tests: signed webhook in, provider mocked with wiremock, files on disk out.

use std::path::Path;

use axum::body::Bytes;
use axum::http::StatusCode;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{Config, StorageConfig};
use crate::test_utils::upstream_config;
use crate::upstream::CredentialPair;
use crate::upstream::signing::{CLIENT_HEADER, Payload, SIGNATURE_HEADER, sign_id, sign_payload};
use crate::{AppState, Application};

fn test_config(server: &MockServer, root: &Path) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        upstream: upstream_config(&server.uri()),
        credentials: vec![CredentialPair::new("k1", "s1"), CredentialPair::new("k2", "s2")],
        storage: StorageConfig { root: root.to_path_buf() },
        enable_metrics: false,
        enable_otel_export: false,
    }
}

/// Mount a signed GET for `resource_path`, signed over `id` with the first credential.
async fn mount_json(server: &MockServer, resource_path: &str, id: &str, status: u16, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/{resource_path}")))
        .and(header(CLIENT_HEADER, "k1"))
        .and(header(SIGNATURE_HEADER, sign_id(id, "s1").as_str()))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_session(server: &MockServer) {
    mount_json(
        server,
        "sessions/s-1/decision",
        "s-1",
        200,
        json!({"status": "success", "verification": {"id": "s-1", "status": "approved", "code": 9001}}),
    )
    .await;
    mount_json(
        server,
        "sessions/s-1/person",
        "s-1",
        200,
        json!({"status": "success", "person": {"firstName": "Ada", "lastName": "Lovelace", "idNumber": "X1"}}),
    )
    .await;
    mount_json(server, "sessions/s-1/media", "s-1", 200, json!({"status": "success", "videos": [], "images": []})).await;
    mount_json(
        server,
        "sessions/s-1/watchlist-screening",
        "s-1",
        200,
        json!({"status": "success", "data": {"hits": []}}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v1/ine-registry/s-1"))
        .and(query_param("version", "1.0"))
        .and(header(SIGNATURE_HEADER, sign_id("s-1", "s1").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success", "valid": true})))
        .mount(server)
        .await;
    // No CURP check on file for this session
    mount_json(server, "curp-registry/s-1", "s-1", 404, json!({"status": "fail"})).await;
    mount_json(
        server,
        "sessions/s-1/attempts",
        "s-1",
        200,
        json!({"status": "success", "verifications": [{"id": "a-1", "status": "submitted"}]}),
    )
    .await;
    mount_json(
        server,
        "attempts/a-1/media",
        "a-1",
        200,
        json!({
            "status": "success",
            "videos": [],
            "images": [{"id": "m-1", "context": "document-front", "mimetype": "image/jpeg", "size": 3, "url": "https://provider.test/m-1"}]
        }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v1/media/m-1"))
        .and(header(SIGNATURE_HEADER, sign_id("m-1", "s1").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"jpg".to_vec(), "image/jpeg"))
        .mount(server)
        .await;
}

async fn drain(state: &AppState) {
    state.tracker.close();
    state.tracker.wait().await;
}

#[test_log::test(tokio::test)]
async fn test_e2e_decision_webhook_files_session() {
    let upstream = MockServer::start().await;
    mount_session(&upstream).await;
    let dir = tempfile::tempdir().unwrap();

    let app = Application::new(test_config(&upstream, dir.path())).await.unwrap();
    let (server, state) = app.into_test_server();

    // Signed with the second credential; the first is active for outbound calls
    let body = br#"{"status":"success","verification":{"id":"s-1","status":"approved"}}"#;
    server
        .post("/webhooks/decision")
        .add_header(SIGNATURE_HEADER, sign_payload(&Payload::Raw(body), "s2").as_str())
        .bytes(Bytes::from_static(body))
        .await
        .assert_status(StatusCode::ACCEPTED);
    drain(&state).await;

    let session = dir.path().join("Ada Lovelace (s-1)");
    let read_json = |name: &str| -> Value { serde_json::from_slice(&std::fs::read(session.join(name)).unwrap()).unwrap() };

    assert_eq!(read_json("decision.json")["verification"]["code"], 9001);
    assert_eq!(read_json("person.json")["person"]["idNumber"], "X1");
    assert_eq!(read_json("ineRegistry.json")["valid"], true);
    assert_eq!(read_json("curpRegistry.json"), Value::Null);
    assert_eq!(read_json("attempts.json")["verifications"][0]["id"], "a-1");
    assert_eq!(read_json("attempts/a-1/media.json")["images"][0]["mimetype"], "image/jpeg");
    assert_eq!(std::fs::read(session.join("attempts/a-1/document-front-m-1.jpeg")).unwrap(), b"jpg");
}

#[tokio::test]
async fn test_e2e_unsigned_webhook_never_reaches_provider() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let app = Application::new(test_config(&upstream, dir.path())).await.unwrap();
    let (server, state) = app.into_test_server();

    let body = br#"{"verification":{"id":"s-1"}}"#;
    server
        .post("/webhooks/decision")
        .add_header(SIGNATURE_HEADER, "deadbeef")
        .bytes(Bytes::from_static(body))
        .expect_failure()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    drain(&state).await;

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_e2e_session_without_person_is_not_filed() {
    let upstream = MockServer::start().await;
    mount_json(
        &upstream,
        "sessions/s-2/decision",
        "s-2",
        200,
        json!({"status": "success", "verification": {"id": "s-2", "status": "declined"}}),
    )
    .await;
    // Everything else, including the person, is unknown to the provider
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&upstream)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let app = Application::new(test_config(&upstream, dir.path())).await.unwrap();
    let (server, state) = app.into_test_server();

    let body = br#"{"verification":{"id":"s-2"}}"#;
    server
        .post("/webhooks/decision")
        .add_header(SIGNATURE_HEADER, sign_payload(&Payload::Raw(body), "s1").as_str())
        .bytes(Bytes::from_static(body))
        .await
        .assert_status(StatusCode::ACCEPTED);
    drain(&state).await;

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_application_rejects_unusable_store_root() {
    let upstream = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, b"").unwrap();

    let result = Application::new(test_config(&upstream, &file.join("store"))).await;
    assert!(result.is_err());
}
