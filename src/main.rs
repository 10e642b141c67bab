use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "quill")]
#[command(version, about = "LLM-driven novel pipeline with human approval checkpoints")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Approve every checkpoint automatically when no chat channel is configured
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Where run directories are created. Overrides quill.toml.
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a novel for a theme
    Run {
        /// Theme or premise of the novel
        theme: Vec<String>,

        /// Announce readiness and wait for `/start [theme]` before running
        #[arg(long)]
        wait_for_start: bool,
    },
    /// Show the progress of a run (defaults to the latest)
    Status {
        run_dir: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and credentials
    Validate,
    /// Write a default quill.toml and editable prompt templates
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    quill::logging::init_console(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run {
            theme,
            wait_for_start,
        } => {
            let theme = Some(theme.join(" ")).filter(|t| !t.trim().is_empty());
            cmd::cmd_run(&cli, project_dir, theme, *wait_for_start).await?;
        }
        Commands::Status { run_dir } => cmd::cmd_status(&cli, &project_dir, run_dir.as_deref())?,
        Commands::Config { command } => cmd::cmd_config(&cli, &project_dir, command.clone())?,
    }

    Ok(())
}
