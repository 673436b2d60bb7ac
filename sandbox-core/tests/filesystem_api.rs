#![allow(clippy::expect_used, clippy::unwrap_used)]

//! HTTP-level tests for the filesystem driver's download/upload endpoints
//! and typed stat/list RPCs, against a mocked server.
//!
//! Every test points a debug-mode `SandboxHandle` at a single `MockServer`:
//! `debug: true` makes `envd_base_url` resolve to `debug_host` unconditionally,
//! so one mock server stands in for both the control plane's `connect` call
//! and the sandbox's own envd agent.

use sandbox_core::SandboxHandle;
use sandbox_core::connection_config::ConnectionConfig;
use sandbox_core::filesystem::types::WriteData;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

async fn connected_handle(server: &MockServer) -> SandboxHandle {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sandboxes/sbx-1/connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sandboxId": "sbx-1",
            "envdVersion": "0.1.9",
        })))
        .mount(server)
        .await;

    let host = server.uri().trim_start_matches("http://").to_string();
    let config = ConnectionConfig::builder()
        .domain(server.uri())
        .debug(true)
        .debug_host(host)
        .build()
        .expect("build config");

    SandboxHandle::connect(config, "sbx-1").await.expect("connect")
}

#[tokio::test]
async fn read_text_downloads_via_get() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/home/user/out.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello from envd"))
        .expect(1)
        .mount(&server)
        .await;

    let handle = connected_handle(&server).await;
    let content = handle.files().read_text("/home/user/out.txt").await.expect("read");
    assert_eq!(content, "hello from envd");
}

#[tokio::test]
async fn read_text_of_missing_file_raises_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/missing.txt"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such file or directory"))
        .expect(1)
        .mount(&server)
        .await;

    let handle = connected_handle(&server).await;
    let err = handle.files().read_text("missing.txt").await.unwrap_err();
    assert!(matches!(err, sandbox_core::SandboxError::NotFound(_)));
}

#[tokio::test]
async fn write_posts_multipart_with_path_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let handle = connected_handle(&server).await;
    let info = handle
        .files()
        .write("notes/todo.txt", WriteData::Text("buy milk".to_string()))
        .await
        .expect("write");
    assert_eq!(info.path, "notes/todo.txt");
    assert_eq!(info.name, "todo.txt");
}

#[tokio::test]
async fn exists_treats_not_found_as_false_not_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/filesystem.Filesystem/Stat"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such file or directory"))
        .expect(1)
        .mount(&server)
        .await;

    let handle = connected_handle(&server).await;
    assert!(!handle.files().exists("ghost.txt").await.expect("exists"));
}

#[tokio::test]
async fn stat_decodes_entry_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/filesystem.Filesystem/Stat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entry": {
                "name": "out.txt",
                "type": "FILE",
                "path": "/home/user/out.txt",
                "size": 42,
                "mode": 420,
                "permissions": "rw-r--r--",
                "owner": "user",
                "group": "user",
                "modifiedTime": "2026-01-01T00:00:00Z",
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let handle = connected_handle(&server).await;
    let entry = handle.files().stat("/home/user/out.txt").await.expect("stat");
    assert_eq!(entry.name, "out.txt");
    assert_eq!(entry.size, 42);
}

#[tokio::test]
async fn list_dir_rejects_zero_depth_without_a_request() {
    let server = MockServer::start().await;
    // No mock mounted for ListDir: a request would panic wiremock's
    // unmatched-request guard, proving the depth check short-circuits
    // locally.
    let handle = connected_handle(&server).await;
    let err = handle.files().list_dir("/home/user", 0).await.unwrap_err();
    assert!(matches!(err, sandbox_core::SandboxError::InvalidArgument(_)));
}
