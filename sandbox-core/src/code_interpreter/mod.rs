//! The code interpreter client: create language-scoped [`Context`]s and run
//! code against them (or a bare language, without a context) through
//! [`run_code`].

pub mod context;
pub mod execution;
pub mod run;

use std::collections::HashMap;

pub use context::Context;
pub use execution::Execution;
pub use execution::ExecutionError;
pub use execution::ExecutionResult;
pub use execution::Logs;
pub use execution::OutputMessage;
pub use run::CodeTarget;
pub use run::RunHandlers;
pub use run::RunTimeouts;

use tokio::task::JoinSet;

use crate::error::Result;
use crate::error::SandboxError;
use crate::transport::ConnectTransport;

/// The default interpreter language used by `create_code_context` when the
/// caller omits one.
pub const DEFAULT_LANGUAGE: &str = "python";

#[derive(Clone)]
pub struct CodeInterpreter {
    transport: ConnectTransport,
}

impl CodeInterpreter {
    pub fn new(transport: ConnectTransport) -> Self {
        Self { transport }
    }

    /// Creates a new execution context. `language` defaults to
    /// [`DEFAULT_LANGUAGE`] when empty.
    pub async fn create_code_context(&self, language: Option<&str>, cwd: Option<&str>) -> Result<Context> {
        let language = language.unwrap_or(DEFAULT_LANGUAGE);
        Context::create(&self.transport, language, cwd).await
    }

    /// Runs code against either a bare language or an existing context, but
    /// never both: returns `InvalidArgument` if both are given.
    pub async fn run_code(
        &self,
        code: &str,
        language: Option<&str>,
        context: Option<&Context>,
        env_vars: Option<&HashMap<String, String>>,
        handlers: RunHandlers,
        timeouts: RunTimeouts,
    ) -> Result<Execution> {
        let target = match (language, context) {
            (Some(_), Some(_)) => {
                return Err(SandboxError::InvalidArgument(
                    "runCode accepts either `language` or `context`, not both".into(),
                ));
            }
            (Some(l), None) => Some(CodeTarget::Language(l)),
            (None, Some(c)) => Some(CodeTarget::Context(&c.id)),
            (None, None) => None,
        };

        let empty = HashMap::new();
        run::run_code(
            &self.transport,
            code,
            target,
            env_vars.unwrap_or(&empty),
            handlers,
            timeouts,
        )
        .await
    }

    /// Destroys every given context concurrently, logging (not propagating)
    /// per-context failures, mirroring the fan-out shape used for tearing
    /// down multiple MCP server connections at once.
    pub async fn destroy_contexts(&self, contexts: Vec<Context>) -> Result<()> {
        let mut join_set = JoinSet::new();
        for context in contexts {
            let transport = self.transport.clone();
            join_set.spawn(async move {
                context.destroy(&transport).await;
            });
        }
        while let Some(res) = join_set.join_next().await {
            res.map_err(|e| SandboxError::Sandbox(format!("context cleanup task panicked: {e}")))?;
        }
        Ok(())
    }
}
