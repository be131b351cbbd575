//! `ftpin fetch` – download every selected file, then print the config diff.

use anyhow::{Context, Result};
use ftpin_core::config::{self, FtpInputConfig};
use ftpin_core::plugin::{FtpFileInputPlugin, PluginTask};
use ftpin_core::task::TaskReport;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const TEMP_SUFFIX: &str = ".part";

pub fn run_fetch(
    cfg: &FtpInputConfig,
    output_dir: &Path,
    jobs: usize,
    store_config: Option<&Path>,
) -> Result<()> {
    let plugin = FtpFileInputPlugin::new();
    let jobs = jobs.max(1);
    let mut control = |task: &PluginTask, count: usize| -> Result<Vec<TaskReport>> {
        run_tasks(&plugin, task, count, output_dir, jobs)
    };
    let diff = plugin.transaction(cfg, &mut control)?;

    match diff.last_path.as_deref() {
        Some(p) => println!("last_path: {}", p),
        None => println!("last_path: (unset)"),
    }
    if let Some(path) = store_config {
        if cfg.incremental {
            config::store_last_path(path, diff.last_path.as_deref())?;
        }
    }
    Ok(())
}

/// Run tasks `0..count` on up to `jobs` threads. Fails with the first task error.
fn run_tasks(
    plugin: &FtpFileInputPlugin,
    task: &PluginTask,
    count: usize,
    output_dir: &Path,
    jobs: usize,
) -> Result<Vec<TaskReport>> {
    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<(usize, Result<TaskReport>)>> = Mutex::new(Vec::with_capacity(count));

    std::thread::scope(|s| {
        for _ in 0..jobs.min(count) {
            s.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                if index >= count {
                    break;
                }
                let res = run_one(plugin, task, index, output_dir);
                let failed = res.is_err();
                results
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push((index, res));
                if failed {
                    // stop handing out new tasks
                    next.store(count, Ordering::SeqCst);
                    break;
                }
            });
        }
    });

    let mut results = results.into_inner().unwrap_or_else(|e| e.into_inner());
    results.sort_by_key(|(i, _)| *i);
    let mut reports = Vec::with_capacity(results.len());
    for (index, res) in results {
        reports.push(res.with_context(|| format!("task {} failed", index))?);
    }
    Ok(reports)
}

fn run_one(plugin: &FtpFileInputPlugin, task: &PluginTask, index: usize, output_dir: &Path) -> Result<TaskReport> {
    let mut input = plugin.open_task(task, index)?;
    let target = local_path(output_dir, input.path());
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let temp = temp_path(&target);
    let file = File::create(&temp).with_context(|| format!("create {}", temp.display()))?;
    let mut writer = BufWriter::new(file);
    let report = input.fetch_to(&mut writer)?;
    drop(writer);
    input.close();
    fs::rename(&temp, &target)
        .with_context(|| format!("rename {} to {}", temp.display(), target.display()))?;
    println!("{}  {:>12}  {}", report.sha256, report.bytes, report.path);
    Ok(report)
}

/// Local file for `remote` under `output_dir`; `.` and `..` components are dropped.
fn local_path(output_dir: &Path, remote: &str) -> PathBuf {
    let mut out = output_dir.to_path_buf();
    for c in Path::new(remote).components() {
        if let Component::Normal(part) = c {
            out.push(part);
        }
    }
    out
}

fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_mirrors_remote_tree() {
        let p = local_path(Path::new("/tmp/out"), "/data/2024/a.csv");
        assert_eq!(p, PathBuf::from("/tmp/out/data/2024/a.csv"));
    }

    #[test]
    fn local_path_stays_under_output_dir() {
        let p = local_path(Path::new("out"), "/data/../../etc/passwd");
        assert_eq!(p, PathBuf::from("out/data/etc/passwd"));
    }

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(temp_path(Path::new("out/a.csv")), PathBuf::from("out/a.csv.part"));
    }

    #[test]
    fn no_tasks_means_no_reports() {
        let plugin = FtpFileInputPlugin::new();
        let cfg = FtpInputConfig::new("h", "/");
        let task = PluginTask::from_config(&cfg).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let reports = run_tasks(&plugin, &task, 0, dir.path(), 4).unwrap();
        assert!(reports.is_empty());
    }
}
