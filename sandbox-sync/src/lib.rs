//! Blocking public façade over `sandbox-core` (L7).
//!
//! Each `SandboxSync` owns a dedicated multi-thread `tokio::runtime::Runtime`
//! and drives every call through `Runtime::block_on`, so the calling thread
//! suspends instead of yielding to a task scheduler. Handlers always run
//! inline on that thread (the blocking façade never spawns a handler task —
//! see `sandbox_core::handler`'s `Inline`/`Spawned` split).

use std::sync::Arc;
use std::time::Duration;

use sandbox_core::SandboxHandle;
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

/// A live connection to one remote sandbox, driven from a blocking thread.
///
/// Each instance owns its own `tokio::runtime::Runtime`; cloning is not
/// supported (unlike the async façade's `Sandbox`), since two clones
/// blocking on the same runtime from different threads would contend for
/// no benefit over just sharing one `SandboxSync`.
pub struct SandboxSync {
    runtime: Arc<tokio::runtime::Runtime>,
    handle: SandboxHandle,
}

impl SandboxSync {
    /// Creates a brand-new sandbox from `template` and health-gates it,
    /// blocking the calling thread until the handle is ready.
    pub fn create(config: ConnectionConfig, template: &str, opts: NewSandboxOpts) -> Result<Self> {
        let runtime = new_runtime()?;
        let handle = runtime.block_on(SandboxHandle::create(config, template, opts))?;
        Ok(Self {
            runtime: Arc::new(runtime),
            handle,
        })
    }

    /// Attaches to an already-running (or paused) sandbox by id.
    pub fn connect(config: ConnectionConfig, sandbox_id: impl Into<String>) -> Result<Self> {
        let runtime = new_runtime()?;
        let handle = runtime.block_on(SandboxHandle::connect(config, sandbox_id))?;
        Ok(Self {
            runtime: Arc::new(runtime),
            handle,
        })
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

    pub fn info(&self) -> Result<SandboxInfo> {
        self.runtime.block_on(self.handle.info())
    }

    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.runtime.block_on(self.handle.set_timeout(timeout))
    }

    pub fn pause(&self) -> Result<()> {
        self.runtime.block_on(self.handle.pause())
    }

    /// Kills the sandbox. Returns `false` if it was already gone.
    pub fn kill(self) -> Result<bool> {
        self.runtime.block_on(self.handle.kill())
    }

    pub fn start_command(&self, cmd: &str, opts: StartOptions) -> Result<CommandHandle> {
        self.runtime.block_on(self.handle.start_command(cmd, opts))
    }

    pub fn connect_command(&self, pid: u32) -> Result<CommandHandle> {
        self.runtime.block_on(self.handle.connect_command(pid))
    }

    /// Blocks until `handle` has drained its event stream, invoking
    /// handlers inline on the calling thread as frames arrive.
    pub fn wait_command(
        &self,
        handle: CommandHandle,
        handlers: WaitHandlers,
        tolerate_non_zero_exit: bool,
    ) -> Result<CommandResult> {
        self.runtime
            .block_on(handle.wait(handlers, tolerate_non_zero_exit))
    }

    /// Convenience composing `start_command` + `wait`: runs `cmd` to
    /// completion and returns its result.
    pub fn run_command(
        &self,
        cmd: &str,
        opts: StartOptions,
        tolerate_non_zero_exit: bool,
    ) -> Result<CommandResult> {
        let handle = self.start_command(cmd, opts)?;
        self.wait_command(handle, WaitHandlers::default(), tolerate_non_zero_exit)
    }

    pub fn start_pty(&self, size: PtySize) -> Result<PtyHandle> {
        self.runtime.block_on(self.handle.start_pty(size))
    }

    pub fn connect_pty(&self, pid: u32) -> Result<PtyHandle> {
        self.runtime.block_on(self.handle.connect_pty(pid))
    }

    pub fn wait_pty(
        &self,
        handle: PtyHandle,
        handlers: WaitHandlers,
        tolerate_non_zero_exit: bool,
    ) -> Result<CommandResult> {
        self.runtime
            .block_on(handle.wait(handlers, tolerate_non_zero_exit))
    }

    /// Convenience composing `create_code_context` + `run_code` against a
    /// fresh context: runs `code` in `language`, discarding the context
    /// afterward.
    pub fn run_code(
        &self,
        code: &str,
        language: &str,
        handlers: RunHandlers,
        timeouts: RunTimeouts,
    ) -> Result<Execution> {
        self.runtime.block_on(self.handle.code_interpreter().run_code(
            code,
            Some(language),
            None,
            None,
            handlers,
            timeouts,
        ))
    }

    pub fn create_code_context(&self, language: &str, cwd: Option<&str>) -> Result<Context> {
        self.runtime.block_on(
            self.handle
                .code_interpreter()
                .create_code_context(Some(language), cwd),
        )
    }

    pub fn run_code_in_context(
        &self,
        code: &str,
        context: &Context,
        handlers: RunHandlers,
        timeouts: RunTimeouts,
    ) -> Result<Execution> {
        self.runtime.block_on(self.handle.code_interpreter().run_code(
            code,
            None,
            Some(context),
            None,
            handlers,
            timeouts,
        ))
    }
}

fn new_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_builds() {
        assert!(new_runtime().is_ok());
    }
}
