//! Process & PTY supervisor: a thin client over envd's `Process` RPC
//! service. Every command and PTY session actually runs inside the sandbox;
//! this module demultiplexes the resulting frame stream into an ordered
//! event sequence the caller consumes through [`command::CommandHandle`] /
//! [`pty::PtyHandle`].

pub mod command;
pub mod pty;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::error::SandboxError;
use crate::transport::ConnectTransport;
use crate::transport::codec::Encoding;
use crate::transport::codec::decode_message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    #[serde(default)]
    pub tag: Option<String>,
    pub cmd: String,
    pub args: Vec<String>,
    pub envs: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub(crate) enum ProcessFrameWire {
    #[serde(rename = "start")]
    Start { pid: u32 },
    #[serde(rename = "stdout-chunk")]
    StdoutChunk { data: String },
    #[serde(rename = "stderr-chunk")]
    StderrChunk { data: String },
    #[serde(rename = "pty-chunk")]
    PtyChunk { data: String },
    #[serde(rename = "end", rename_all = "camelCase")]
    End {
        exit_code: i32,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        status: Option<String>,
    },
}

/// One demultiplexed frame of a process/PTY event stream, after the start
/// handshake has been consumed.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Pty(Vec<u8>),
    End {
        exit_code: i32,
        error: Option<String>,
        status: Option<String>,
    },
}

/// Result of `CommandHandle::wait`/`PtyHandle::wait`: accumulated stdout and
/// stderr (pty output is not separately accumulated — handlers are the only
/// consumer) and the terminal exit code.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct ListQuery {}

/// Issues the start handshake: sends the encoded start request, then reads
/// exactly one frame expected to be a `start` event. Any other first frame
/// is a protocol violation.
pub(crate) async fn start_handshake(
    transport: &ConnectTransport,
    path: &str,
    body: &impl serde::Serialize,
) -> Result<(u32, crate::transport::FrameStream)> {
    use futures::StreamExt;

    let mut stream = transport.server_stream(path, body, None).await?;
    let first = stream
        .next()
        .await
        .ok_or_else(|| SandboxError::Sandbox("stream ended before the start event".into()))??;

    let wire: ProcessFrameWire = decode_message(Encoding::Json, &first.payload)?;
    match wire {
        ProcessFrameWire::Start { pid } => Ok((pid, stream)),
        _ => Err(SandboxError::Sandbox(
            "expected a start event as the first frame".into(),
        )),
    }
}

/// Decodes one non-start frame into a [`ProcessEvent`].
pub(crate) fn decode_process_frame(payload: &[u8]) -> Result<ProcessEvent> {
    let wire: ProcessFrameWire = decode_message(Encoding::Json, payload)?;
    Ok(match wire {
        ProcessFrameWire::Start { pid } => {
            return Err(SandboxError::Sandbox(format!(
                "unexpected duplicate start event for pid {pid}"
            )));
        }
        ProcessFrameWire::StdoutChunk { data } => ProcessEvent::Stdout(data.into_bytes()),
        ProcessFrameWire::StderrChunk { data } => ProcessEvent::Stderr(data.into_bytes()),
        ProcessFrameWire::PtyChunk { data } => ProcessEvent::Pty(data.into_bytes()),
        ProcessFrameWire::End {
            exit_code,
            error,
            status,
        } => ProcessEvent::End {
            exit_code,
            error,
            status,
        },
    })
}

/// Client over the `list`/`sendSignal` unary RPCs shared by both command and
/// PTY sessions.
pub struct ProcessClient {
    transport: ConnectTransport,
}

impl ProcessClient {
    pub(crate) fn new(transport: ConnectTransport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &ConnectTransport {
        &self.transport
    }

    pub async fn list(&self) -> Result<Vec<ProcessInfo>> {
        self.transport
            .unary("/process.Process/List", &ListQuery::default(), None)
            .await
    }

    /// Fire-and-forget `SIGKILL`. Returns `false` if the server reports the
    /// process was not found (already exited).
    pub async fn kill(&self, pid: u32) -> Result<bool> {
        #[derive(Serialize)]
        struct SendSignalRequest {
            pid: u32,
            signal: &'static str,
        }
        match self
            .transport
            .unary::<_, serde_json::Value>(
                "/process.Process/SendSignal",
                &SendSignalRequest {
                    pid,
                    signal: "SIGKILL",
                },
                None,
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(SandboxError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn send_stdin(&self, pid: u32, data: &[u8]) -> Result<()> {
        #[derive(Serialize)]
        struct SendStdinRequest<'a> {
            pid: u32,
            data: &'a str,
        }
        let encoded = String::from_utf8_lossy(data);
        let _: serde_json::Value = self
            .transport
            .unary(
                "/process.Process/SendInput",
                &SendStdinRequest {
                    pid,
                    data: &encoded,
                },
                None,
            )
            .await?;
        Ok(())
    }
}
