#![allow(clippy::expect_used, clippy::unwrap_used)]

//! HTTP-level tests for `ManagementClient` against a mocked control plane:
//! start a `MockServer`, assert on both response handling and the exact
//! requests the client issued.

use sandbox_core::ConnectionConfig;
use sandbox_core::management::ManagementClient;
use sandbox_core::management::NewSandboxOpts;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn config_for(server: &MockServer) -> ConnectionConfig {
    ConnectionConfig::builder()
        .domain(server.uri())
        .build()
        .expect("build config")
}

#[tokio::test]
async fn kill_returns_false_on_404_instead_of_raising() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/sandboxes/missing-id"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = ManagementClient::new(config_for(&server)).expect("client");
    let existed = client.kill("missing-id").await.expect("kill should not raise");
    assert!(!existed);
}

#[tokio::test]
async fn kill_returns_true_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/sandboxes/sbx-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = ManagementClient::new(config_for(&server)).expect("client");
    assert!(client.kill("sbx-1").await.expect("kill"));
}

#[tokio::test]
async fn pause_treats_409_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sandboxes/sbx-1/pause"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    let client = ManagementClient::new(config_for(&server)).expect("client");
    client.pause("sbx-1").await.expect("409 should be treated as already paused");
}

#[tokio::test]
async fn pause_propagates_404_as_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sandboxes/gone/pause"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = ManagementClient::new(config_for(&server)).expect("client");
    let err = client.pause("gone").await.unwrap_err();
    assert!(matches!(err, sandbox_core::SandboxError::NotFound(_)));
}

#[tokio::test]
async fn create_sandbox_posts_expected_body_and_decodes_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sandboxes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sandboxId": "sbx-42",
            "domain": "sbx-42.sandboxes.dev",
            "envdVersion": "0.2.0",
            "envdAccessToken": "tok-abc",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ManagementClient::new(config_for(&server)).expect("client");
    let created = client
        .create_sandbox("base", NewSandboxOpts::default())
        .await
        .expect("create");

    assert_eq!(created.sandbox_id, "sbx-42");
    assert_eq!(created.sandbox_domain.as_deref(), Some("sbx-42.sandboxes.dev"));
    assert_eq!(created.envd_version, "0.2.0");
    assert_eq!(created.envd_access_token.as_deref(), Some("tok-abc"));

    let request = &server.received_requests().await.expect("requests")[0];
    let body = request.body_json::<serde_json::Value>().expect("json body");
    assert_eq!(body["templateId"], "base");
    assert_eq!(body["secure"], false);
}

#[tokio::test]
async fn list_sends_percent_encoded_metadata_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sandboxes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = ManagementClient::new(config_for(&server)).expect("client");
    let mut metadata = std::collections::HashMap::new();
    metadata.insert("env".to_string(), "prod uk".to_string());
    let sandboxes = client
        .list(Some(sandbox_core::management::SandboxQuery { metadata }))
        .await
        .expect("list");
    assert!(sandboxes.is_empty());

    let request = &server.received_requests().await.expect("requests")[0];
    assert!(request.url.query().expect("query").contains("metadata=env%3Dprod%20uk"));
}

#[tokio::test]
async fn kill_and_metrics_short_circuit_in_debug_mode() {
    // Debug mode never contacts the control plane for these operations, so
    // no mock is registered at all -- if the client tried to reach the
    // server, this test would hang/fail on an unmocked request.
    let config = ConnectionConfig::builder()
        .domain("unused.invalid")
        .debug(true)
        .build()
        .expect("build");
    let client = ManagementClient::new(config).expect("client");

    assert!(client.kill("anything").await.expect("debug kill"));
    assert!(
        client
            .get_metrics("anything", None, None)
            .await
            .expect("debug metrics")
            .is_empty()
    );
}
