//! `run_code`: opens the `ExecutionService`'s server-streaming `Execute`
//! RPC and demultiplexes `stdout`/`stderr`/`result`/`error` frames into an
//! [`Execution`], invoking the caller's handlers per frame through the
//! shared [`crate::handler::Handler`] abstraction. A spawned-task
//! demultiplexer races each frame read against an idle timeout so a stalled
//! connection surfaces as a timeout rather than hanging forever.

use std::time::Duration;
use std::time::Instant;

use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use tokio::time::timeout;

use crate::code_interpreter::execution::Execution;
use crate::code_interpreter::execution::ExecutionError;
use crate::code_interpreter::execution::ExecutionResult;
use crate::code_interpreter::execution::OutputMessage;
use crate::error::Result;
use crate::error::SandboxError;
use crate::handler::BoxHandler;
use crate::handler::Noop;
use crate::transport::ConnectTransport;
use crate::transport::codec::Encoding;
use crate::transport::codec::decode_message;

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest<'a> {
    code: &'a str,
    language: Option<&'a str>,
    context_id: Option<&'a str>,
    env_vars: &'a std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ExecuteFrameWire {
    #[serde(rename_all = "camelCase")]
    Stdout {
        content: String,
        ts_ns: i64,
    },
    #[serde(rename_all = "camelCase")]
    Stderr {
        content: String,
        ts_ns: i64,
    },
    Result(ExecutionResult),
    Error {
        name: String,
        value: String,
        traceback: String,
    },
}

/// Handlers passed to [`run_code`]. Each is optional; a missing handler is
/// simply a no-op.
#[derive(Default)]
pub struct RunHandlers {
    pub on_stdout: Option<BoxHandler<OutputMessage>>,
    pub on_stderr: Option<BoxHandler<OutputMessage>>,
    pub on_result: Option<BoxHandler<ExecutionResult>>,
    pub on_error: Option<BoxHandler<ExecutionError>>,
}

/// Either a bare language string or an existing context id, never both.
pub enum CodeTarget<'a> {
    Language(&'a str),
    Context(&'a str),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunTimeouts {
    /// Per-frame read deadline. `None` uses the transport's default idle
    /// timeout.
    pub request_timeout: Option<Duration>,
    /// Whole-execution wall-clock cap. `Some(Duration::ZERO)` disables it.
    pub timeout: Option<Duration>,
}

pub async fn run_code(
    transport: &ConnectTransport,
    code: &str,
    target: Option<CodeTarget<'_>>,
    env_vars: &std::collections::HashMap<String, String>,
    handlers: RunHandlers,
    timeouts: RunTimeouts,
) -> Result<Execution> {
    let (language, context_id) = match target {
        Some(CodeTarget::Language(l)) => (Some(l), None),
        Some(CodeTarget::Context(c)) => (None, Some(c)),
        None => (None, None),
    };

    let body = ExecuteRequest {
        code,
        language,
        context_id,
        env_vars,
    };

    let mut stream = transport
        .server_stream("/execution.ExecutionService/Execute", &body, None)
        .await?;

    let on_stdout: BoxHandler<OutputMessage> = handlers.on_stdout.unwrap_or_else(|| std::sync::Arc::new(Noop));
    let on_stderr: BoxHandler<OutputMessage> = handlers.on_stderr.unwrap_or_else(|| std::sync::Arc::new(Noop));
    let on_result: BoxHandler<ExecutionResult> = handlers.on_result.unwrap_or_else(|| std::sync::Arc::new(Noop));
    let on_error: BoxHandler<ExecutionError> = handlers.on_error.unwrap_or_else(|| std::sync::Arc::new(Noop));

    let request_timeout = timeouts
        .request_timeout
        .unwrap_or_else(|| *crate::flags::SBX_STREAM_IDLE_TIMEOUT_MS);
    let execution_deadline = match timeouts.timeout {
        Some(d) if d.is_zero() => None,
        Some(d) => Some(Instant::now() + request_timeout + d),
        None => Some(Instant::now() + request_timeout + Duration::from_secs(60)),
    };

    let mut execution = Execution::default();

    loop {
        if let Some(deadline) = execution_deadline
            && Instant::now() >= deadline
        {
            return Err(SandboxError::Timeout(format_execution_timeout_error()));
        }

        let next = match timeout(request_timeout, stream.next()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(_) => return Err(SandboxError::Timeout(format_request_timeout_error())),
        };

        let frame = next?;
        if frame.is_end_stream() {
            break;
        }

        let wire: ExecuteFrameWire = decode_message(Encoding::Json, &frame.payload)?;
        match wire {
            ExecuteFrameWire::Stdout { content, ts_ns } => {
                execution.push_stdout(&content);
                on_stdout.dispatch(OutputMessage {
                    content,
                    ts_ns,
                    error: false,
                });
            }
            ExecuteFrameWire::Stderr { content, ts_ns } => {
                execution.push_stderr(&content);
                on_stderr.dispatch(OutputMessage {
                    content,
                    ts_ns,
                    error: true,
                });
            }
            ExecuteFrameWire::Result(result) => {
                execution.push_result(result.clone());
                on_result.dispatch(result);
            }
            ExecuteFrameWire::Error {
                name,
                value,
                traceback,
            } => {
                let error = ExecutionError {
                    name,
                    value,
                    traceback,
                };
                execution.set_error(error.clone());
                on_error.dispatch(error);
            }
        }
    }

    Ok(execution)
}

/// Matches the server's textual trigger for an execution-side timeout (the
/// sandboxed code itself ran too long) as distinct from a pure transport
/// stall.
pub fn format_execution_timeout_error() -> String {
    "execution timed out: the running code exceeded the requested execution timeout".to_string()
}

pub fn format_request_timeout_error() -> String {
    "request timed out: no frame was received within the request timeout".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutual_exclusivity_is_expressed_in_the_type_not_runtime_checked_here() {
        // CodeTarget itself cannot represent "both"; InvalidArgument for the
        // ambiguous case is enforced by the façade layer, which is what
        // receives separate `language: Option<&str>` and `context: Option<&Context>`
        // constructor arguments from the caller.
        let target = CodeTarget::Language("python");
        assert!(matches!(target, CodeTarget::Language(_)));
    }
}
