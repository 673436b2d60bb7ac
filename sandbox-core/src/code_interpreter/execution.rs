//! Value types accumulated by `run_code`: `Execution`, `Result` (rich MIME
//! output), `ExecutionError`, and the `OutputMessage` passed to stdout/
//! stderr handlers.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMessage {
    pub content: String,
    pub ts_ns: i64,
    pub error: bool,
}

/// MIME-polymorphic execution result. Any subset of the rich fields may be
/// present; at most one `Result` per `Execution` has `is_main_result = true`
/// (enforced by [`super::run::run_code`], not by this type).
///
/// `#[serde(default)]` on the container: the server only sends the MIME
/// fields actually produced by a given result, so every field not present
/// in a frame must deserialize as its `Default` rather than erroring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionResult {
    pub text: Option<String>,
    pub html: Option<String>,
    pub markdown: Option<String>,
    pub svg: Option<String>,
    /// Base64-encoded.
    pub png: Option<String>,
    /// Base64-encoded.
    pub jpeg: Option<String>,
    pub pdf: Option<String>,
    pub latex: Option<String>,
    pub json: Option<serde_json::Value>,
    pub javascript: Option<String>,
    pub data: Option<serde_json::Value>,
    pub chart: Option<serde_json::Value>,
    pub execution_count: Option<u64>,
    pub is_main_result: bool,
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    pub name: String,
    pub value: String,
    pub traceback: String,
}

#[derive(Debug, Clone, Default)]
pub struct Logs {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Accumulates every frame observed for one `run_code` call.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub results: Vec<ExecutionResult>,
    pub logs: Logs,
    pub error: Option<ExecutionError>,
    pub execution_count: Option<u64>,
}

impl Execution {
    pub(crate) fn push_stdout(&mut self, content: &str) {
        self.logs.stdout.push(content.to_string());
    }

    pub(crate) fn push_stderr(&mut self, content: &str) {
        self.logs.stderr.push(content.to_string());
    }

    pub(crate) fn push_result(&mut self, result: ExecutionResult) {
        if result.is_main_result
            && let Some(count) = result.execution_count
        {
            self.execution_count = Some(count);
        }
        self.results.push(result);
    }

    pub(crate) fn set_error(&mut self, error: ExecutionError) {
        self.error = Some(error);
    }
}
