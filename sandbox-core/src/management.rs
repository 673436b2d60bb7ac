//! Sandbox lifecycle / fleet management: list, inspect, create, kill, pause,
//! connect, set-timeout, and metrics, all against the control-plane REST API
//! (distinct from the per-sandbox envd API driven by [`crate::transport`]).

use std::collections::HashMap;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::connection_config::ConnectionConfig;
use crate::error::Result;
use crate::error::SandboxError;
use crate::transport::ConnectTransport;

/// Default sandbox timeout applied when a caller does not specify one.
pub const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxState {
    Running,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedSandbox {
    pub sandbox_id: String,
    pub template_id: String,
    pub name: Option<String>,
    pub state: SandboxState,
    pub cpu_count: i64,
    pub memory_mb: i64,
    pub metadata: HashMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub sandbox_id: String,
    pub sandbox_domain: Option<String>,
    pub template_id: String,
    pub name: Option<String>,
    pub metadata: HashMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub envd_version: String,
    /// Access token scoping this handle's envd calls, when the sandbox was
    /// created with `secure: true`. Not part of the public API surface.
    pub(crate) envd_access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxMetrics {
    pub cpu_count: i64,
    pub cpu_used_pct: f64,
    pub disk_total: u64,
    pub disk_used: u64,
    pub mem_total: u64,
    pub mem_used: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SandboxQuery {
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct SandboxCreateResponse {
    pub sandbox_id: String,
    pub sandbox_domain: Option<String>,
    pub envd_version: String,
    pub envd_access_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSandboxOpts {
    pub metadata: HashMap<String, String>,
    pub env_vars: HashMap<String, String>,
    pub secure: bool,
    pub allow_internet_access: bool,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewSandboxRequest<'a> {
    template_id: &'a str,
    metadata: &'a HashMap<String, String>,
    timeout: u64,
    env_vars: &'a HashMap<String, String>,
    secure: bool,
    allow_internet_access: bool,
}

#[derive(Debug, Serialize)]
struct SetTimeoutRequest {
    timeout: u64,
}

#[derive(Debug, Serialize)]
struct ConnectSandboxRequest {
    timeout: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SandboxCreateResponseWire {
    sandbox_id: String,
    #[serde(default)]
    domain: Option<String>,
    envd_version: String,
    #[serde(default)]
    envd_access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedSandboxWire {
    sandbox_id: String,
    template_id: String,
    #[serde(default)]
    alias: Option<String>,
    state: SandboxState,
    cpu_count: i64,
    memory_mb: i64,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
    started_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SandboxInfoWire {
    sandbox_id: String,
    #[serde(default)]
    domain: Option<String>,
    template_id: String,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
    started_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    envd_version: String,
    #[serde(default)]
    envd_access_token: Option<String>,
}

/// Thin client over the control-plane REST API. Built from a `ConnectionConfig`
/// per call site rather than holding one connection open for the process
/// lifetime.
pub struct ManagementClient {
    transport: ConnectTransport,
}

impl ManagementClient {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Ok(Self {
            transport: ConnectTransport::new(config)?,
        })
    }

    pub fn from_transport(transport: ConnectTransport) -> Self {
        Self { transport }
    }

    pub async fn list(&self, query: Option<SandboxQuery>) -> Result<Vec<ListedSandbox>> {
        let metadata_qs = query
            .filter(|q| !q.metadata.is_empty())
            .map(|q| encode_metadata_query(&q.metadata));

        let path = match metadata_qs {
            Some(qs) => format!("/sandboxes?metadata={qs}"),
            None => "/sandboxes".to_string(),
        };

        let wire: Vec<ListedSandboxWire> = self.transport.get(&path).await?;
        Ok(wire.into_iter().map(ListedSandbox::from).collect())
    }

    pub async fn get_info(&self, sandbox_id: &str) -> Result<SandboxInfo> {
        let path = format!("/sandboxes/{sandbox_id}");
        let wire: SandboxInfoWire = self.transport.get(&path).await?;
        Ok(SandboxInfo::from(wire))
    }

    /// Kills a running sandbox. Returns `false` if it was already gone (404) --
    /// killing an already-gone sandbox is success, not an error. A no-op in
    /// debug mode, since a locally-running envd has no control-plane record
    /// to delete.
    pub async fn kill(&self, sandbox_id: &str) -> Result<bool> {
        if self.transport.config().debug {
            return Ok(true);
        }
        let path = format!("/sandboxes/{sandbox_id}");
        match self.transport.delete::<serde_json::Value>(&path).await {
            Ok(_) => Ok(true),
            Err(SandboxError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn set_timeout(&self, sandbox_id: &str, timeout: Duration) -> Result<()> {
        if self.transport.config().debug {
            return Ok(());
        }
        let path = format!("/sandboxes/{sandbox_id}/timeout");
        let body = SetTimeoutRequest {
            timeout: timeout.as_secs(),
        };
        let _: serde_json::Value = self.transport.post(&path, &body).await?;
        Ok(())
    }

    pub async fn create_sandbox(
        &self,
        template: &str,
        opts: NewSandboxOpts,
    ) -> Result<SandboxCreateResponse> {
        let timeout = opts
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_SANDBOX_TIMEOUT_SECS));
        let body = NewSandboxRequest {
            template_id: template,
            metadata: &opts.metadata,
            timeout: timeout.as_secs(),
            env_vars: &opts.env_vars,
            secure: opts.secure,
            allow_internet_access: opts.allow_internet_access,
        };
        debug!(template, "creating sandbox");
        let wire: SandboxCreateResponseWire = self.transport.post("/sandboxes", &body).await?;
        Ok(SandboxCreateResponse {
            sandbox_id: wire.sandbox_id,
            sandbox_domain: wire.domain,
            envd_version: wire.envd_version,
            envd_access_token: wire.envd_access_token,
        })
    }

    /// Sandbox metrics time series. A no-op in debug mode: a local envd does
    /// not report to the control plane's metrics pipeline.
    pub async fn get_metrics(
        &self,
        sandbox_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<SandboxMetrics>> {
        if self.transport.config().debug {
            return Ok(Vec::new());
        }
        let mut path = format!("/sandboxes/{sandbox_id}/metrics");
        let mut params = Vec::new();
        if let Some(s) = start {
            params.push(format!("start={}", s.timestamp_millis()));
        }
        if let Some(e) = end {
            params.push(format!("end={}", e.timestamp_millis()));
        }
        if !params.is_empty() {
            path.push('?');
            path.push_str(&params.join("&"));
        }
        self.transport.get(&path).await
    }

    /// Resumes a paused sandbox and hands back a connection config scoped to
    /// it, including the envd access token header when the sandbox is
    /// secured. The caller (`sandbox::Sandbox::connect`) builds the full
    /// handle from this.
    pub async fn connect(
        &self,
        sandbox_id: &str,
        timeout: Option<Duration>,
    ) -> Result<SandboxCreateResponse> {
        let timeout = timeout.unwrap_or(Duration::from_secs(DEFAULT_SANDBOX_TIMEOUT_SECS));
        let path = format!("/sandboxes/{sandbox_id}/connect");
        let body = ConnectSandboxRequest {
            timeout: timeout.as_secs(),
        };
        let wire: SandboxCreateResponseWire = self
            .transport
            .post(&path, &body)
            .await
            .map_err(|e| match e {
                SandboxError::NotFound(_) => {
                    SandboxError::NotFound(format!("paused sandbox {sandbox_id} not found"))
                }
                other => other,
            })?;
        Ok(SandboxCreateResponse {
            sandbox_id: wire.sandbox_id,
            sandbox_domain: wire.domain,
            envd_version: wire.envd_version,
            envd_access_token: wire.envd_access_token,
        })
    }

    /// Pauses a running sandbox. A 409 (already paused) is treated as success.
    pub async fn pause(&self, sandbox_id: &str) -> Result<String> {
        let path = format!("/sandboxes/{sandbox_id}/pause");
        match self
            .transport
            .post::<(), serde_json::Value>(&path, &())
            .await
        {
            Ok(_) => Ok(sandbox_id.to_string()),
            Err(SandboxError::NotFound(_)) => Err(SandboxError::NotFound(format!(
                "sandbox {sandbox_id} not found"
            ))),
            Err(SandboxError::Sandbox(msg)) if msg.contains("409") => Ok(sandbox_id.to_string()),
            Err(e) => Err(e),
        }
    }
}

fn encode_metadata_query(metadata: &HashMap<String, String>) -> String {
    use percent_encoding::NON_ALPHANUMERIC;
    use percent_encoding::utf8_percent_encode;

    metadata
        .iter()
        .map(|(k, v)| {
            format!(
                "{}%3D{}",
                utf8_percent_encode(k, NON_ALPHANUMERIC),
                utf8_percent_encode(v, NON_ALPHANUMERIC)
            )
        })
        .collect::<Vec<_>>()
        .join("%26")
}

impl From<ListedSandboxWire> for ListedSandbox {
    fn from(w: ListedSandboxWire) -> Self {
        Self {
            sandbox_id: w.sandbox_id,
            template_id: w.template_id,
            name: w.alias,
            state: w.state,
            cpu_count: w.cpu_count,
            memory_mb: w.memory_mb,
            metadata: w.metadata.unwrap_or_default(),
            started_at: w.started_at,
            end_at: w.end_at,
        }
    }
}

impl From<SandboxInfoWire> for SandboxInfo {
    fn from(w: SandboxInfoWire) -> Self {
        Self {
            sandbox_id: w.sandbox_id,
            sandbox_domain: w.domain,
            template_id: w.template_id,
            name: w.alias,
            metadata: w.metadata.unwrap_or_default(),
            started_at: w.started_at,
            end_at: w.end_at,
            envd_version: w.envd_version,
            envd_access_token: w.envd_access_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_query_percent_encodes_keys_and_values() {
        let mut metadata = HashMap::new();
        metadata.insert("env".to_string(), "prod uk".to_string());
        let qs = encode_metadata_query(&metadata);
        assert_eq!(qs, "env%3Dprod%20uk");
    }

    #[test]
    fn default_timeout_is_five_minutes() {
        assert_eq!(DEFAULT_SANDBOX_TIMEOUT_SECS, 300);
    }
}
