//! `Context`: a named, language-scoped execution environment created
//! through the `ContextService`'s unary `CreateContext`/`DestroyContext`
//! RPCs.

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::transport::ConnectTransport;

#[derive(Debug, Serialize)]
struct CreateContextRequest<'a> {
    language: &'a str,
    cwd: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateContextResponse {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DestroyContextRequest<'a> {
    context_id: &'a str,
}

/// A created execution context. Destruction is idempotent: server errors
/// are logged and swallowed, so `destroy` never fails the caller.
#[derive(Debug, Clone)]
pub struct Context {
    pub id: String,
    pub language: String,
    pub cwd: Option<String>,
}

impl Context {
    pub(crate) async fn create(
        transport: &ConnectTransport,
        language: &str,
        cwd: Option<&str>,
    ) -> Result<Self> {
        let body = CreateContextRequest { language, cwd };
        let resp: CreateContextResponse = transport
            .unary("/execution.ContextService/CreateContext", &body, None)
            .await?;
        Ok(Self {
            id: resp.id,
            language: language.to_string(),
            cwd: cwd.map(str::to_string),
        })
    }

    /// Destroys this context server-side. Errors are logged at `warn` and
    /// swallowed rather than propagated.
    pub async fn destroy(&self, transport: &ConnectTransport) {
        let body = DestroyContextRequest {
            context_id: &self.id,
        };
        if let Err(e) = transport
            .unary::<_, serde_json::Value>("/execution.ContextService/DestroyContext", &body, None)
            .await
        {
            warn!(context_id = %self.id, error = %e, "failed to destroy code interpreter context");
        }
    }
}
