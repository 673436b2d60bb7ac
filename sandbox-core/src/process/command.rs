//! `CommandHandle`: the client side of a single started or attached process.

use std::collections::HashMap;

use futures::StreamExt;
use serde::Serialize;

use crate::error::Result;
use crate::error::SandboxError;
use crate::handler::BoxHandler;
use crate::handler::Noop;
use crate::process::CommandResult;
use crate::process::ProcessClient;
use crate::process::ProcessEvent;
use crate::process::decode_process_frame;
use crate::process::start_handshake;
use crate::transport::ConnectTransport;
use crate::transport::FrameStream;

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub cwd: Option<String>,
    pub envs: HashMap<String, String>,
    pub tag: Option<String>,
}

#[derive(Debug, Serialize)]
struct StartRequest<'a> {
    cmd: &'a str,
    envs: &'a HashMap<String, String>,
    cwd: Option<&'a str>,
    tag: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ConnectRequest {
    pid: u32,
}

/// Optional set of handlers passed to [`CommandHandle::wait`]. `None` is
/// equivalent to a [`crate::handler::Noop`] handler for that channel.
#[derive(Default)]
pub struct WaitHandlers {
    pub on_stdout: Option<BoxHandler<Vec<u8>>>,
    pub on_stderr: Option<BoxHandler<Vec<u8>>>,
}

/// Owns the remainder of a process's event stream after the start
/// handshake. `pid` is available immediately; `wait` drains the stream to a
/// terminal [`CommandResult`].
pub struct CommandHandle {
    pid: u32,
    stream: Option<FrameStream>,
    client: ProcessClient,
}

impl CommandHandle {
    pub(crate) async fn start(transport: ConnectTransport, cmd: &str, opts: StartOptions) -> Result<Self> {
        let body = StartRequest {
            cmd,
            envs: &opts.envs,
            cwd: opts.cwd.as_deref(),
            tag: opts.tag.as_deref(),
        };
        let (pid, stream) = start_handshake(&transport, "/process.Process/Start", &body).await?;
        Ok(Self {
            pid,
            stream: Some(stream),
            client: ProcessClient::new(transport),
        })
    }

    /// Re-attaches to an already-running process, replaying from the
    /// server's retained buffer. The start handshake is identical to
    /// `start`.
    pub(crate) async fn connect(transport: ConnectTransport, pid: u32) -> Result<Self> {
        let body = ConnectRequest { pid };
        let (confirmed_pid, stream) =
            start_handshake(&transport, "/process.Process/Connect", &body).await?;
        Ok(Self {
            pid: confirmed_pid,
            stream: Some(stream),
            client: ProcessClient::new(transport),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Consumes the stream to completion, invoking handlers per chunk and
    /// accumulating decoded stdout/stderr. Raises `CommandExit` when the
    /// process exited non-zero and `tolerate_non_zero_exit` is `false`.
    pub async fn wait(
        mut self,
        handlers: WaitHandlers,
        tolerate_non_zero_exit: bool,
    ) -> Result<CommandResult> {
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| SandboxError::Sandbox("command handle already consumed".into()))?;

        let on_stdout: BoxHandler<Vec<u8>> = handlers.on_stdout.unwrap_or_else(|| std::sync::Arc::new(Noop));
        let on_stderr: BoxHandler<Vec<u8>> = handlers.on_stderr.unwrap_or_else(|| std::sync::Arc::new(Noop));

        let mut result = CommandResult::default();
        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();

        while let Some(frame) = stream.next().await {
            let frame = frame?;
            if frame.is_end_stream() {
                break;
            }
            match decode_process_frame(&frame.payload)? {
                ProcessEvent::Stdout(bytes) => {
                    stdout_buf.push_str(&String::from_utf8_lossy(&bytes));
                    on_stdout.dispatch(bytes);
                }
                ProcessEvent::Stderr(bytes) => {
                    stderr_buf.push_str(&String::from_utf8_lossy(&bytes));
                    on_stderr.dispatch(bytes);
                }
                ProcessEvent::Pty(_) => {
                    // A plain command stream never emits pty-chunk frames;
                    // ignore defensively rather than erroring.
                }
                ProcessEvent::End {
                    exit_code,
                    error,
                    status: _,
                } => {
                    result.exit_code = exit_code;
                    result.error = error;
                    break;
                }
            }
        }

        result.stdout = stdout_buf;
        result.stderr = stderr_buf;

        if result.exit_code != 0 && !tolerate_non_zero_exit {
            return Err(SandboxError::CommandExit {
                exit_code: result.exit_code,
                error: result.error,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        Ok(result)
    }

    /// Fire-and-forget `SIGKILL`. `false` if the server reports the process
    /// was already gone.
    pub async fn kill(&self) -> Result<bool> {
        self.client.kill(self.pid).await
    }

    /// Cancels the stream without killing the remote process; it keeps
    /// running and can be re-attached via `connect(pid)`.
    pub fn disconnect(&mut self) {
        if let Some(stream) = &mut self.stream {
            stream.cancel();
        }
    }

    pub async fn send_stdin(&self, data: &[u8]) -> Result<()> {
        self.client.send_stdin(self.pid, data).await
    }
}
