//! `ftpin completions <shell>`

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::Shell;
use std::io;

use crate::cli::Cli;

pub fn run_completions(shell: Shell) -> Result<()> {
    let mut app = Cli::command();
    let bin_name = app.get_name().to_string();
    clap_complete::generate(shell, &mut app, bin_name, &mut io::stdout());
    Ok(())
}
