use clap::Parser;

use sandbox_cli::Cli;
use sandbox_cli::Command;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Sandbox(args) => sandbox_cli::run_sandbox(args).await,
        Command::Exec(args) => sandbox_cli::run_exec(args).await,
    }
}
