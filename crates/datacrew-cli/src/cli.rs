use clap::{Parser, Subcommand};
use datacrew_core::ProviderKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "datacrew")]
#[command(about = "Multi-agent data science workflow runner", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the agent workflow on a dataset")]
    Run(RunArgs),

    #[command(about = "Show the effective configuration")]
    Config {
        #[arg(long, help = "Config file to read instead of ~/.datacrew/config.toml")]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
pub struct RunArgs {
    #[arg(help = "What the team should find out or build")]
    pub request: String,

    #[arg(short, long, help = "Dataset path or URI")]
    pub dataset: String,

    #[arg(long, help = "Config file to read instead of ~/.datacrew/config.toml")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Iteration ceiling (overrides config)")]
    pub max_iterations: Option<u32>,

    #[arg(long, help = "Model backend: mock, openrouter or ollama (overrides config)")]
    pub provider: Option<ProviderKind>,

    #[arg(long, help = "Model name (overrides config)")]
    pub model: Option<String>,

    #[arg(long, help = "JSON file with scripted replies for the mock provider")]
    pub script: Option<PathBuf>,

    #[arg(long, help = "Fail an agent step instead of storing a fallback record")]
    pub fail_on_parse_miss: bool,

    #[arg(long, help = "Session storage root (overrides config)")]
    pub workspace: Option<PathBuf>,

    #[arg(long, help = "Do not write state.json after every cycle")]
    pub no_checkpoint: bool,

    #[arg(long, help = "Write logs to this file instead of stderr")]
    pub log_file: Option<PathBuf>,
}
