//! `SandboxHandle`: the composite, per-sandbox entry point gluing together
//! the management client, filesystem driver, process/pty clients, and code
//! interpreter over one shared [`ConnectTransport`], with both a "create
//! new" and an "already exists, just connect" entry point.

use std::time::Duration;

use crate::code_interpreter::CodeInterpreter;
use crate::connection_config::ConnectionConfig;
use crate::error::Result;
use crate::filesystem::Filesystem;
use crate::lifecycle::wait_until_healthy;
use crate::management::ManagementClient;
use crate::management::NewSandboxOpts;
use crate::management::SandboxInfo;
use crate::process::ProcessClient;
use crate::process::command::CommandHandle;
use crate::process::command::StartOptions;
use crate::process::pty::PtyHandle;
use crate::process::pty::PtySize;
use crate::transport::ConnectTransport;

/// A live connection to one remote sandbox. Cloning shares the underlying
/// HTTP connection pool (`ConnectTransport` is cheaply `Clone`).
#[derive(Clone)]
pub struct SandboxHandle {
    sandbox_id: String,
    transport: ConnectTransport,
    management: ManagementClient,
    filesystem: Filesystem,
    process: ProcessClient,
    code_interpreter: CodeInterpreter,
}

impl SandboxHandle {
    /// Creates a brand-new sandbox from `template`, then health-gates before
    /// returning.
    pub async fn create(config: ConnectionConfig, template: &str, opts: NewSandboxOpts) -> Result<Self> {
        let transport = ConnectTransport::new(config)?;
        let management = ManagementClient::from_transport(transport.clone());
        let created = management.create_sandbox(template, opts).await?;
        let scoped = transport.with_envd(created.sandbox_domain, created.envd_access_token);
        let handle = Self::assemble(scoped, created.sandbox_id, None);
        wait_until_healthy(&handle.transport).await;
        Ok(handle)
    }

    /// Attaches to an already-running sandbox by id, resuming it first if
    /// paused, then health-gating exactly as `create` does.
    pub async fn connect(config: ConnectionConfig, sandbox_id: impl Into<String>) -> Result<Self> {
        let sandbox_id = sandbox_id.into();
        let transport = ConnectTransport::new(config)?;
        let management = ManagementClient::from_transport(transport.clone());
        let resumed = management.connect(&sandbox_id, None).await?;
        let envd_version = Some(resumed.envd_version.clone());
        let scoped = transport.with_envd(resumed.sandbox_domain, resumed.envd_access_token);
        let handle = Self::assemble(scoped, sandbox_id, envd_version);
        wait_until_healthy(&handle.transport).await;
        Ok(handle)
    }

    fn assemble(transport: ConnectTransport, sandbox_id: String, envd_version: Option<String>) -> Self {
        let envd_api_url = transport.envd_base_url();
        Self {
            management: ManagementClient::from_transport(transport.clone()),
            filesystem: Filesystem::new(transport.clone(), envd_api_url, envd_version),
            process: ProcessClient::new(transport.clone()),
            code_interpreter: CodeInterpreter::new(transport.clone()),
            sandbox_id,
            transport,
        }
    }

    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    pub fn files(&self) -> &Filesystem {
        &self.filesystem
    }

    pub fn commands(&self) -> &ProcessClient {
        &self.process
    }

    pub fn code_interpreter(&self) -> &CodeInterpreter {
        &self.code_interpreter
    }

    pub async fn start_command(&self, cmd: &str, opts: StartOptions) -> Result<CommandHandle> {
        CommandHandle::start(self.transport.clone(), cmd, opts).await
    }

    pub async fn connect_command(&self, pid: u32) -> Result<CommandHandle> {
        CommandHandle::connect(self.transport.clone(), pid).await
    }

    pub async fn start_pty(&self, size: PtySize) -> Result<PtyHandle> {
        PtyHandle::start(self.transport.clone(), size).await
    }

    pub async fn connect_pty(&self, pid: u32) -> Result<PtyHandle> {
        PtyHandle::connect(self.transport.clone(), pid).await
    }

    pub async fn info(&self) -> Result<SandboxInfo> {
        self.management.get_info(&self.sandbox_id).await
    }

    pub async fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.management.set_timeout(&self.sandbox_id, timeout).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.management.pause(&self.sandbox_id).await?;
        Ok(())
    }

    /// Kills the sandbox. Returns `false` if it was already gone.
    pub async fn kill(self) -> Result<bool> {
        self.management.kill(&self.sandbox_id).await
    }
}
