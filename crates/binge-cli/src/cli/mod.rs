//! CLI for the binge download scheduler.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use binge_core::config;
use binge_core::job::Priority;
use clap::{Parser, Subcommand};
use clap_complete::Shell;

use commands::{run_completions, run_config, run_get, GetArgs};

/// Top-level CLI for the binge download scheduler.
#[derive(Debug, Parser)]
#[command(name = "binge")]
#[command(about = "binge: prioritized, resumable batch downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one or more files, several at a time.
    Get {
        /// Direct HTTP/HTTPS URLs, in episode order.
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// Queue priority: high, medium or low.
        #[arg(long, short, default_value = "medium", value_parser = parse_queue_priority)]
        priority: Priority,

        /// Destination directory (default: config `download_dir`, else current dir).
        #[arg(long, short, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Series title; files are named "<NAME> - E<NN>.<ext>".
        #[arg(long, value_name = "NAME")]
        name: Option<String>,

        /// Episode number of the first URL (with --name).
        #[arg(long, default_value = "1", value_name = "N")]
        episode: u32,

        /// Override `max_concurrent_downloads` for this run (1..=10).
        #[arg(long, value_name = "N")]
        max_concurrent: Option<u32>,

        /// Print final job states as JSON instead of progress lines.
        #[arg(long)]
        json: bool,
    },

    /// Show the config file path and the effective settings.
    Config,

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Priority for a new batch. `paused` is refused: nothing would ever start
/// and `get` would wait forever.
fn parse_queue_priority(s: &str) -> Result<Priority, String> {
    match s.parse::<Priority>() {
        Ok(Priority::Paused) => {
            Err("a new download cannot start paused (expected high, medium or low)".to_string())
        }
        Ok(priority) => Ok(priority),
        Err(e) => Err(e.to_string()),
    }
}

impl CliCommand {
    /// Parses arguments and runs the command. `Ok(false)` means the command
    /// ran but some download did not finish.
    pub async fn run_from_args() -> Result<bool> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Get {
                urls,
                priority,
                dir,
                name,
                episode,
                max_concurrent,
                json,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                let args = GetArgs {
                    urls,
                    priority,
                    dir,
                    name,
                    episode,
                    max_concurrent,
                    json,
                };
                run_get(&cfg, args).await
            }
            CliCommand::Config => {
                let cfg = config::load_or_init()?;
                run_config(&cfg)?;
                Ok(true)
            }
            CliCommand::Completions { shell } => {
                run_completions(shell);
                Ok(true)
            }
        }
    }
}
