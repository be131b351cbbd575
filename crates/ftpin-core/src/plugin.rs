//! Job-level glue: configuration to file list, one task per file, and the
//! watermark handed to the next run.

use anyhow::{Context, Result};

use crate::client::{CurlFtpClient, FtpClient, Security};
use crate::config::FtpInputConfig;
use crate::listing::{next_last_path, PathMatcher};
use crate::retry::RetryPolicy;
use crate::session::{FtpSession, SessionOptions};
use crate::task::{FtpFileInput, TaskReport};
use crate::tls::TlsPolicy;

/// Validated, ready-to-run form of [`FtpInputConfig`], plus the selected files.
#[derive(Debug, Clone)]
pub struct PluginTask {
    pub session: SessionOptions,
    pub path_prefix: String,
    pub last_path: Option<String>,
    pub matcher: PathMatcher,
    pub incremental: bool,
    pub retry: RetryPolicy,
    /// One entry per task, filled by [`FtpFileInputPlugin::transaction`].
    pub files: Vec<String>,
}

impl PluginTask {
    pub fn from_config(config: &FtpInputConfig) -> Result<Self> {
        let security = match (config.ssl, config.ssl_explicit) {
            (false, _) => Security::Plain,
            (true, true) => Security::Explicit,
            (true, false) => Security::Implicit,
        };
        let tls = if config.ssl {
            TlsPolicy::configure(
                config.ssl_verify,
                config.ssl_verify_hostname,
                config.ssl_trusted_ca_cert_file.as_deref(),
                config.ssl_trusted_ca_cert_data.as_deref(),
            )?
        } else {
            TlsPolicy::default()
        };
        let matcher = PathMatcher::new(&config.path_match_pattern)
            .with_context(|| format!("invalid path_match_pattern '{}'", config.path_match_pattern))?;

        let session = SessionOptions {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            password: config.password.clone(),
            passive_mode: config.passive_mode,
            ascii_mode: config.ascii_mode,
            security,
            tls,
            timeouts: config.timeouts(),
        };
        Ok(Self {
            session,
            path_prefix: config.path_prefix.clone(),
            last_path: config.last_path.clone(),
            matcher,
            incremental: config.incremental,
            retry: config.retry_policy(),
            files: Vec::new(),
        })
    }

    pub fn task_count(&self) -> usize {
        self.files.len()
    }
}

/// Config changes for the next run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    pub last_path: Option<String>,
}

/// Runs the tasks of a job; supplied by the host.
pub trait Control {
    fn run(&mut self, task: &PluginTask, task_count: usize) -> Result<Vec<TaskReport>>;
}

impl<F> Control for F
where
    F: FnMut(&PluginTask, usize) -> Result<Vec<TaskReport>>,
{
    fn run(&mut self, task: &PluginTask, task_count: usize) -> Result<Vec<TaskReport>> {
        self(task, task_count)
    }
}

/// Creates one client per session.
pub trait ClientFactory: Send + Sync {
    fn new_client(&self) -> Box<dyn FtpClient>;
}

impl<F> ClientFactory for F
where
    F: Fn() -> Box<dyn FtpClient> + Send + Sync,
{
    fn new_client(&self) -> Box<dyn FtpClient> {
        self()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CurlClientFactory;

impl ClientFactory for CurlClientFactory {
    fn new_client(&self) -> Box<dyn FtpClient> {
        Box::new(CurlFtpClient::new())
    }
}

pub struct FtpFileInputPlugin<F = CurlClientFactory> {
    factory: F,
}

impl FtpFileInputPlugin<CurlClientFactory> {
    pub fn new() -> Self {
        Self {
            factory: CurlClientFactory,
        }
    }
}

impl Default for FtpFileInputPlugin<CurlClientFactory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ClientFactory> FtpFileInputPlugin<F> {
    pub fn with_factory(factory: F) -> Self {
        Self { factory }
    }

    /// List the input files, then run one task per file through `control`.
    pub fn transaction(&self, config: &FtpInputConfig, control: &mut dyn Control) -> Result<ConfigDiff> {
        let mut task = PluginTask::from_config(config)?;
        task.files = self.list_files(&task)?;
        tracing::info!(files = ?task.files, "Using files {:?}", task.files);
        if task.files.is_empty() {
            tracing::warn!(prefix = %task.path_prefix, "No files to read");
        }
        let count = task.task_count();
        self.resume(&task, count, control)
    }

    /// Run `task_count` tasks and derive the next config.
    pub fn resume(&self, task: &PluginTask, task_count: usize, control: &mut dyn Control) -> Result<ConfigDiff> {
        let reports = control.run(task, task_count)?;
        let bytes: u64 = reports.iter().map(|r| r.bytes).sum();
        tracing::info!(tasks = reports.len(), bytes, "All tasks finished");

        if !task.incremental {
            return Ok(ConfigDiff::default());
        }
        Ok(ConfigDiff {
            last_path: next_last_path(&task.files, task.last_path.as_deref()),
        })
    }

    /// Selected files for `task`, over a short-lived session.
    pub fn list_files(&self, task: &PluginTask) -> Result<Vec<String>> {
        // the watermark always filters; `incremental` only decides the diff
        let last_path = task.last_path.as_deref();
        let mut session = FtpSession::open(self.factory.new_client(), &task.session)
            .with_context(|| format!("failed to connect to {}", task.session.host))?;
        let files = session
            .list_files(&task.path_prefix, last_path, &task.matcher)
            .with_context(|| format!("failed to list files under '{}'", task.path_prefix))?;
        session.disconnect();
        Ok(files)
    }

    /// Input for task `index`: its own session reading `task.files[index]`.
    pub fn open_task(&self, task: &PluginTask, index: usize) -> Result<FtpFileInput> {
        let path = task
            .files
            .get(index)
            .with_context(|| format!("task index {} out of range ({} files)", index, task.files.len()))?;
        FtpFileInput::open(index, self.factory.new_client(), &task.session, path.clone(), task.retry)
            .with_context(|| format!("failed to open session for {}", path))
    }
}
