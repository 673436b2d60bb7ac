//! Argument types and dispatch logic for the `sandbox` CLI.
//!
//! Kept separate from `main.rs` so the subcommand types stay testable
//! without a process boundary, mirroring how the wider workspace splits
//! `clap`-derived argument structs from the binary entry point.

use std::collections::HashMap;

use clap::Args;
use clap::Parser;
use clap::Subcommand;

use sandbox_core::ConnectionConfig;
use sandbox_core::SandboxHandle;
use sandbox_core::code_interpreter::ExecutionResult;
use sandbox_core::code_interpreter::OutputMessage;
use sandbox_core::code_interpreter::RunHandlers;
use sandbox_core::code_interpreter::RunTimeouts;
use sandbox_core::handler::inline;
use sandbox_core::management::ManagementClient;
use sandbox_core::management::NewSandboxOpts;

#[derive(Debug, Parser)]
#[command(name = "sandbox", author, version, about = "Sandbox Control Plane SDK CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create, list, or destroy sandboxes against the Management API.
    Sandbox(SandboxArgs),
    /// Run code in a sandbox's code interpreter.
    Exec(ExecArgs),
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct SandboxArgs {
    /// Create a sandbox from this template id.
    #[arg(long, value_name = "TEMPLATE")]
    pub create: Option<String>,

    /// List running sandboxes.
    #[arg(long)]
    pub list: bool,

    /// Destroy the sandbox with this id.
    #[arg(long, value_name = "ID")]
    pub destroy: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Source code to run.
    #[arg(long)]
    pub code: String,

    /// Interpreter language (e.g. "python", "javascript").
    #[arg(long)]
    pub language: String,

    /// Run against an existing sandbox instead of creating a throwaway one.
    #[arg(long, value_name = "ID")]
    pub sandbox_id: Option<String>,

    /// Fire the execution and return immediately instead of waiting for the
    /// result (stdout/stderr/result are not printed in this mode).
    #[arg(long)]
    pub r#async: bool,
}

pub async fn run_sandbox(args: SandboxArgs) -> anyhow::Result<()> {
    let config = ConnectionConfig::builder().build()?;

    if let Some(template) = args.create {
        let handle = SandboxHandle::create(config, &template, NewSandboxOpts::default()).await?;
        println!("{}", handle.sandbox_id());
        return Ok(());
    }

    if args.list {
        let management = ManagementClient::new(config)?;
        for sandbox in management.list(None).await? {
            println!(
                "{}\t{}\t{:?}",
                sandbox.sandbox_id, sandbox.template_id, sandbox.state
            );
        }
        return Ok(());
    }

    if let Some(sandbox_id) = args.destroy {
        let management = ManagementClient::new(config)?;
        let existed = management.kill(&sandbox_id).await?;
        if !existed {
            tracing::warn!(sandbox_id, "sandbox already gone");
        }
        return Ok(());
    }

    unreachable!("clap enforces exactly one of --create/--list/--destroy")
}

pub async fn run_exec(args: ExecArgs) -> anyhow::Result<()> {
    let config = ConnectionConfig::builder().build()?;

    let (handle, owns_sandbox) = match args.sandbox_id {
        Some(id) => (SandboxHandle::connect(config, id).await?, false),
        None => (
            SandboxHandle::create(config, "base", NewSandboxOpts::default()).await?,
            true,
        ),
    };

    if args.r#async {
        let transport_handle = handle.clone();
        let code = args.code;
        let language = args.language;
        tokio::spawn(async move {
            let _ = transport_handle
                .code_interpreter()
                .run_code(
                    &code,
                    Some(&language),
                    None,
                    None,
                    RunHandlers::default(),
                    RunTimeouts::default(),
                )
                .await;
        });
        println!("{}", handle.sandbox_id());
        return Ok(());
    }

    let handlers = RunHandlers {
        on_stdout: Some(inline(|msg: OutputMessage| print!("{}", msg.content))),
        on_stderr: Some(inline(|msg: OutputMessage| eprint!("{}", msg.content))),
        ..Default::default()
    };

    let execution = handle
        .code_interpreter()
        .run_code(
            &args.code,
            Some(&args.language),
            None,
            None,
            handlers,
            RunTimeouts::default(),
        )
        .await?;

    print_results(&execution.results);

    if let Some(error) = execution.error {
        anyhow::bail!("{}: {}", error.name, error.value);
    }

    if owns_sandbox {
        let _ = handle.kill().await;
    }

    Ok(())
}

fn print_results(results: &[ExecutionResult]) {
    for result in results {
        if let Some(text) = &result.text {
            println!("{text}");
        }
    }
}

/// Metadata helper exercised by tests: mirrors `NewSandboxOpts::default()`'s
/// empty-metadata behavior so `sandbox --create` never silently tags a
/// sandbox.
pub fn empty_metadata() -> HashMap<String, String> {
    HashMap::new()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_create() {
        let cli = Cli::try_parse_from(["sandbox", "sandbox", "--create", "base"]).expect("parse");
        match cli.command {
            Command::Sandbox(args) => assert_eq!(args.create.as_deref(), Some("base")),
            _ => panic!("expected Sandbox subcommand"),
        }
    }

    #[test]
    fn cli_rejects_multiple_sandbox_actions() {
        let result = Cli::try_parse_from(["sandbox", "sandbox", "--create", "base", "--list"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_exec() {
        let cli = Cli::try_parse_from([
            "sandbox",
            "exec",
            "--code",
            "print(1)",
            "--language",
            "python",
        ])
        .expect("parse");
        match cli.command {
            Command::Exec(args) => {
                assert_eq!(args.code, "print(1)");
                assert_eq!(args.language, "python");
                assert!(!args.r#async);
            }
            _ => panic!("expected Exec subcommand"),
        }
    }

    #[test]
    fn empty_metadata_is_empty() {
        assert!(empty_metadata().is_empty());
    }

    #[test]
    fn cli_command_builds() {
        Cli::command().debug_assert();
    }
}
