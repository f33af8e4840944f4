//! Datacrew CLI - runs the multi-agent data science workflow from the terminal
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser as _;
use cli::{Cli, Commands};

mod cli;
mod handlers;
mod render;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let success = handlers::handle_run(args).await?;
            Ok(if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Config { config } => {
            handlers::handle_config(config.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
