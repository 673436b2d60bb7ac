#![allow(clippy::expect_used, clippy::unwrap_used)]

//! HTTP-level test of the process start handshake and frame demultiplexing
//! over a raw Connect-RPC streaming body, exercising the binary frame codec
//! in `sandbox_core::transport::frame` directly against a mocked server.

use bytes::Bytes;
use bytes::BytesMut;
use sandbox_core::SandboxHandle;
use sandbox_core::connection_config::ConnectionConfig;
use sandbox_core::process::command::StartOptions;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

const FLAG_END_STREAM: u8 = 0x02;

fn encode_frame(flags: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(5 + payload.len());
    buf.extend_from_slice(&[flags]);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf.freeze()
}

fn json_frame(body: &serde_json::Value) -> Bytes {
    encode_frame(0, &serde_json::to_vec(body).expect("encode"))
}

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
async fn start_command_demultiplexes_stdout_stderr_and_end() {
    let server = MockServer::start().await;

    let mut body = BytesMut::new();
    body.extend_from_slice(&json_frame(&serde_json::json!({"kind": "start", "pid": 777})));
    body.extend_from_slice(&json_frame(
        &serde_json::json!({"kind": "stdout-chunk", "data": "building...\n"}),
    ));
    body.extend_from_slice(&json_frame(
        &serde_json::json!({"kind": "stderr-chunk", "data": "warning: unused import\n"}),
    ));
    body.extend_from_slice(&json_frame(
        &serde_json::json!({"kind": "end", "exitCode": 0}),
    ));
    body.extend_from_slice(&encode_frame(FLAG_END_STREAM, b"{}"));

    Mock::given(method("POST"))
        .and(path("/process.Process/Start"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/connect+json")
                .set_body_raw(body.freeze(), "application/connect+json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let handle = connected_handle(&server).await;
    let command = handle
        .start_command("cargo build", StartOptions::default())
        .await
        .expect("start");
    assert_eq!(command.pid(), 777);

    let result = command
        .wait(Default::default(), true)
        .await
        .expect("wait");
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "building...\n");
    assert_eq!(result.stderr, "warning: unused import\n");
}

#[tokio::test]
async fn start_command_raises_command_exit_on_nonzero_code() {
    let server = MockServer::start().await;

    let mut body = BytesMut::new();
    body.extend_from_slice(&json_frame(&serde_json::json!({"kind": "start", "pid": 5})));
    body.extend_from_slice(&json_frame(
        &serde_json::json!({"kind": "end", "exitCode": 1, "error": "exit status 1"}),
    ));
    body.extend_from_slice(&encode_frame(FLAG_END_STREAM, b"{}"));

    Mock::given(method("POST"))
        .and(path("/process.Process/Start"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/connect+json")
                .set_body_raw(body.freeze(), "application/connect+json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let handle = connected_handle(&server).await;
    let command = handle
        .start_command("false", StartOptions::default())
        .await
        .expect("start");

    let err = command.wait(Default::default(), false).await.unwrap_err();
    assert!(matches!(
        err,
        sandbox_core::SandboxError::CommandExit { exit_code: 1, .. }
    ));
}
