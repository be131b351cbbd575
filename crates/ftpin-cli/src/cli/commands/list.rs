//! `ftpin list` – show the files the next run would read.

use anyhow::Result;
use ftpin_core::config::FtpInputConfig;
use ftpin_core::listing::next_last_path;
use ftpin_core::plugin::{FtpFileInputPlugin, PluginTask};

pub fn run_list(cfg: &FtpInputConfig) -> Result<()> {
    let plugin = FtpFileInputPlugin::new();
    let task = PluginTask::from_config(cfg)?;
    let files = plugin.list_files(&task)?;
    if files.is_empty() {
        println!("No files under {}.", task.path_prefix);
        return Ok(());
    }
    for f in &files {
        println!("{}", f);
    }
    if task.incremental {
        if let Some(next) = next_last_path(&files, task.last_path.as_deref()) {
            println!("next last_path: {}", next);
        }
    }
    Ok(())
}
