use reqwest::StatusCode;
use thiserror::Error;
use tokio::task::JoinError;

pub type Result<T> = std::result::Result<T, SandboxError>;

/// Error kinds surfaced to SDK callers.
///
/// Every variant carries a single-line human message (via `Display`) and,
/// where applicable, the originating HTTP status so callers can branch on
/// transport-level detail without string matching.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Bad local input that never reached the network, e.g. `listDir` with
    /// `depth < 1` or passing both `language` and `context` to `runCode`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 401 from the management API or the envd agent.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// 404, or `exists()` recognizing a "no such file or directory" response.
    #[error("not found: {0}")]
    NotFound(String),

    /// 507 from the envd agent.
    #[error("not enough space: {0}")]
    NotEnoughSpace(String),

    /// 429 from the management API or the envd agent.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// A capability mismatch, e.g. recursive directory watch on an envd
    /// version older than `ENVD_VERSION_RECURSIVE_WATCH`.
    #[error("template capability error: {0}")]
    Template(String),

    /// Either a pure transport timeout or an execution-deadline timeout; the
    /// message text distinguishes the two (see `format_request_timeout_error`
    /// / `format_execution_timeout_error` in the code interpreter).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Non-zero process exit while the caller did not opt into tolerant mode.
    #[error("command exited with code {exit_code}: {stderr}")]
    CommandExit {
        exit_code: i32,
        error: Option<String>,
        stdout: String,
        stderr: String,
    },

    /// Any other >=300 response, or a protocol-level failure (malformed
    /// frame, missing start handshake, etc).
    #[error("sandbox error: {0}")]
    Sandbox(String),

    /// The calling façade cancelled the underlying stream.
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TokioJoin(#[from] JoinError),

    #[error("missing environment variable: `{0}`")]
    EnvVar(String),
}

impl SandboxError {
    /// Maps an HTTP status code from either the Management API or the envd
    /// agent to an error kind. `body` should be the best-effort parsed
    /// `{"message": ...}` field, or else the raw response body text.
    pub fn from_status(status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            StatusCode::BAD_REQUEST => SandboxError::InvalidArgument(body),
            StatusCode::UNAUTHORIZED => SandboxError::Authentication(body),
            StatusCode::NOT_FOUND => SandboxError::NotFound(body),
            StatusCode::TOO_MANY_REQUESTS => SandboxError::RateLimit(body),
            StatusCode::BAD_GATEWAY => SandboxError::Timeout(body),
            StatusCode::INSUFFICIENT_STORAGE => SandboxError::NotEnoughSpace(body),
            other => SandboxError::Sandbox(format!("unexpected status {other}: {body}")),
        }
    }

    /// Best-effort extraction of `{"message": ...}` from a JSON error body,
    /// falling back to the raw text.
    pub fn message_from_body(body: &str) -> String {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| body.to_string())
    }
}

/// UI-facing single-line message, collapsing the verbose `CommandExit`
/// variant down to just stderr the way a terminal user expects.
pub fn get_error_message_ui(e: &SandboxError) -> String {
    match e {
        SandboxError::CommandExit { stderr, .. } => stderr.clone(),
        _ => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_codes_to_kinds() {
        assert!(matches!(
            SandboxError::from_status(StatusCode::BAD_REQUEST, "x"),
            SandboxError::InvalidArgument(_)
        ));
        assert!(matches!(
            SandboxError::from_status(StatusCode::NOT_FOUND, "x"),
            SandboxError::NotFound(_)
        ));
        assert!(matches!(
            SandboxError::from_status(StatusCode::TOO_MANY_REQUESTS, "x"),
            SandboxError::RateLimit(_)
        ));
        assert!(matches!(
            SandboxError::from_status(StatusCode::BAD_GATEWAY, "x"),
            SandboxError::Timeout(_)
        ));
        assert!(matches!(
            SandboxError::from_status(StatusCode::INSUFFICIENT_STORAGE, "x"),
            SandboxError::NotEnoughSpace(_)
        ));
    }

    #[test]
    fn message_from_body_prefers_json_message() {
        assert_eq!(
            SandboxError::message_from_body(r#"{"message": "nope"}"#),
            "nope"
        );
        assert_eq!(SandboxError::message_from_body("raw text"), "raw text");
    }

    #[test]
    fn command_exit_ui_message_is_stderr_only() {
        let err = SandboxError::CommandExit {
            exit_code: 1,
            error: None,
            stdout: "out".into(),
            stderr: "boom".into(),
        };
        assert_eq!(get_error_message_ui(&err), "boom");
    }
}
