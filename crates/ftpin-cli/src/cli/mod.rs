//! CLI for ftpin.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use ftpin_core::config;
use std::path::PathBuf;

use commands::{run_completions, run_fetch, run_list};

/// Top-level CLI for ftpin.
#[derive(Debug, Parser)]
#[command(name = "ftpin")]
#[command(about = "ftpin: incremental file input from FTP/FTPS servers", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/ftpin/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List the files the next run would read.
    List,

    /// Download every selected file and print the next `last_path`.
    Fetch {
        /// Directory the files are written to, mirroring their remote paths.
        #[arg(long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,
        /// Run up to N tasks concurrently, each with its own session.
        #[arg(long, default_value = "1", value_name = "N")]
        jobs: usize,
        /// Write the new `last_path` back into the config file.
        #[arg(long)]
        update_config: bool,
    },

    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        if let CliCommand::Completions { shell } = cli.command {
            return run_completions(shell);
        }

        let config_path = match cli.config {
            Some(p) => p,
            None => config::config_path()?,
        };
        let cfg = config::load_from_path(&config_path)?;
        tracing::debug!("loaded config from {}: {:?}", config_path.display(), cfg);

        match cli.command {
            CliCommand::List => run_list(&cfg)?,
            CliCommand::Fetch {
                output_dir,
                jobs,
                update_config,
            } => {
                let store = update_config.then_some(config_path.as_path());
                run_fetch(&cfg, &output_dir, jobs, store)?;
            }
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
