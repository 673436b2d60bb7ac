//! `PtyHandle`: the client side of a started or attached PTY session.
//!
//! Shares its start handshake and frame demultiplexing with
//! [`crate::process::command::CommandHandle`]; the differences are the
//! request shape (`/bin/bash -i -l` plus a terminal size rather than
//! `/bin/bash -l -c <cmd>`) and the `resize` mutation path, which is routed
//! through the `update` unary RPC instead of a dedicated method.

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

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PtySize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for PtySize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

#[derive(Debug, Serialize)]
struct StartPtyRequest {
    size: PtySize,
}

#[derive(Debug, Serialize)]
struct ConnectRequest {
    pid: u32,
}

#[derive(Debug, Serialize)]
struct ResizeRequest {
    pid: u32,
    size: PtySize,
}

#[derive(Default)]
pub struct WaitHandlers {
    pub on_pty: Option<BoxHandler<Vec<u8>>>,
}

pub struct PtyHandle {
    pid: u32,
    stream: Option<FrameStream>,
    client: ProcessClient,
}

impl PtyHandle {
    pub(crate) async fn start(transport: ConnectTransport, size: PtySize) -> Result<Self> {
        let body = StartPtyRequest { size };
        let (pid, stream) = start_handshake(&transport, "/process.Process/Start", &body).await?;
        Ok(Self {
            pid,
            stream: Some(stream),
            client: ProcessClient::new(transport),
        })
    }

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

    pub async fn wait(mut self, handlers: WaitHandlers, tolerate_non_zero_exit: bool) -> Result<CommandResult> {
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| SandboxError::Sandbox("pty handle already consumed".into()))?;

        let on_pty: BoxHandler<Vec<u8>> = handlers.on_pty.unwrap_or_else(|| std::sync::Arc::new(Noop));

        use futures::StreamExt;
        let mut result = CommandResult::default();

        while let Some(frame) = stream.next().await {
            let frame = frame?;
            if frame.is_end_stream() {
                break;
            }
            match decode_process_frame(&frame.payload)? {
                ProcessEvent::Pty(bytes) => on_pty.dispatch(bytes),
                ProcessEvent::Stdout(_) | ProcessEvent::Stderr(_) => {
                    // A PTY stream never emits separate stdout/stderr
                    // frames; ignore defensively.
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

        if result.exit_code != 0 && !tolerate_non_zero_exit {
            return Err(SandboxError::CommandExit {
                exit_code: result.exit_code,
                error: result.error,
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        Ok(result)
    }

    pub async fn kill(&self) -> Result<bool> {
        self.client.kill(self.pid).await
    }

    pub fn disconnect(&mut self) {
        if let Some(stream) = &mut self.stream {
            stream.cancel();
        }
    }

    pub async fn send_stdin(&self, data: &[u8]) -> Result<()> {
        self.client.send_stdin(self.pid, data).await
    }

    /// Resizes the PTY, routed through the `update` unary RPC rather than a
    /// dedicated method.
    pub async fn resize(&self, size: PtySize) -> Result<()> {
        let body = ResizeRequest { pid: self.pid, size };
        let _: serde_json::Value = self
            .client
            .transport()
            .unary("/process.Process/Update", &body, None)
            .await?;
        Ok(())
    }
}
