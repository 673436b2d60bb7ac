//! Cooperative (async) public façade over `sandbox-core` (L7).
//!
//! A thin, cloneable wrapper that composes the lower layers into the calls
//! most callers actually reach for, without re-deriving any of their
//! semantics — every suspension point below `Sandbox` is still a plain
//! `.await` on `sandbox-core`.

use std::time::Duration;

use sandbox_core::code_interpreter::CodeInterpreter;
use sandbox_core::code_interpreter::Context;
use sandbox_core::code_interpreter::Execution;
use sandbox_core::code_interpreter::RunHandlers;
use sandbox_core::code_interpreter::RunTimeouts;
use sandbox_core::filesystem::Filesystem;
use sandbox_core::management::NewSandboxOpts;
use sandbox_core::management::SandboxInfo;
use sandbox_core::process::CommandResult;
use sandbox_core::process::ProcessClient;
use sandbox_core::process::command::CommandHandle;
use sandbox_core::process::command::StartOptions;
use sandbox_core::process::command::WaitHandlers;
use sandbox_core::process::pty::PtyHandle;
use sandbox_core::process::pty::PtySize;

pub use sandbox_core::ConnectionConfig;
pub use sandbox_core::ConnectionConfigBuilder;
pub use sandbox_core::Result;
pub use sandbox_core::SandboxError;
pub use sandbox_core::SandboxHandle;
pub use sandbox_core::handler;

/// A live connection to one remote sandbox, driven from an async task.
///
/// Cloning is cheap: it shares the underlying HTTP/2 connection pool, the
/// same way cloning a `SandboxHandle` does.
#[derive(Clone)]
pub struct Sandbox {
    handle: SandboxHandle,
}

impl Sandbox {
    /// Creates a brand-new sandbox from `template` and health-gates it.
    pub async fn create(config: ConnectionConfig, template: &str, opts: NewSandboxOpts) -> Result<Self> {
        let handle = SandboxHandle::create(config, template, opts).await?;
        Ok(Self { handle })
    }

    /// Attaches to an already-running (or paused) sandbox by id.
    pub async fn connect(config: ConnectionConfig, sandbox_id: impl Into<String>) -> Result<Self> {
        let handle = SandboxHandle::connect(config, sandbox_id).await?;
        Ok(Self { handle })
    }

    /// Wraps an already-assembled handle, e.g. one obtained via
    /// `sandbox-sync`'s blocking bridge.
    pub fn from_handle(handle: SandboxHandle) -> Self {
        Self { handle }
    }

    pub fn into_handle(self) -> SandboxHandle {
        self.handle
    }

    pub fn id(&self) -> &str {
        self.handle.sandbox_id()
    }

    pub fn files(&self) -> &Filesystem {
        self.handle.files()
    }

    pub fn commands(&self) -> &ProcessClient {
        self.handle.commands()
    }

    pub fn code_interpreter(&self) -> &CodeInterpreter {
        self.handle.code_interpreter()
    }

    pub async fn info(&self) -> Result<SandboxInfo> {
        self.handle.info().await
    }

    pub async fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.handle.set_timeout(timeout).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.handle.pause().await
    }

    /// Kills the sandbox. Returns `false` if it was already gone.
    pub async fn kill(self) -> Result<bool> {
        self.handle.kill().await
    }

    pub async fn start_command(&self, cmd: &str, opts: StartOptions) -> Result<CommandHandle> {
        self.handle.start_command(cmd, opts).await
    }

    pub async fn connect_command(&self, pid: u32) -> Result<CommandHandle> {
        self.handle.connect_command(pid).await
    }

    /// Convenience composing `start_command` + `wait`: runs `cmd` to
    /// completion and returns its result, discarding the intermediate
    /// `CommandHandle`.
    pub async fn run_command(
        &self,
        cmd: &str,
        opts: StartOptions,
        tolerate_non_zero_exit: bool,
    ) -> Result<CommandResult> {
        let handle = self.start_command(cmd, opts).await?;
        handle.wait(WaitHandlers::default(), tolerate_non_zero_exit).await
    }

    pub async fn start_pty(&self, size: PtySize) -> Result<PtyHandle> {
        self.handle.start_pty(size).await
    }

    pub async fn connect_pty(&self, pid: u32) -> Result<PtyHandle> {
        self.handle.connect_pty(pid).await
    }

    /// Convenience composing `create_code_context` + `run_code` against a
    /// fresh context: runs `code` in `language`, discarding the context
    /// afterward.
    pub async fn run_code(
        &self,
        code: &str,
        language: &str,
        handlers: RunHandlers,
        timeouts: RunTimeouts,
    ) -> Result<Execution> {
        self.handle
            .code_interpreter()
            .run_code(code, Some(language), None, None, handlers, timeouts)
            .await
    }

    /// Convenience composing `create_code_context` + `run_code` against it,
    /// returning both the context (for reuse) and the execution.
    pub async fn run_code_in_new_context(
        &self,
        code: &str,
        language: &str,
        cwd: Option<&str>,
        handlers: RunHandlers,
        timeouts: RunTimeouts,
    ) -> Result<(Context, Execution)> {
        let context = self
            .handle
            .code_interpreter()
            .create_code_context(Some(language), cwd)
            .await?;
        let execution = self
            .handle
            .code_interpreter()
            .run_code(code, None, Some(&context), None, handlers, timeouts)
            .await?;
        Ok((context, execution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_config_builder_is_reexported() {
        let config = ConnectionConfig::builder().domain("example.com").build();
        assert!(config.is_ok());
    }
}
