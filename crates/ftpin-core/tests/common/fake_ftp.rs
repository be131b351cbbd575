//! In-memory FTP server behind the `FtpClient` trait.
//!
//! Holds a small file tree, tracks the working directory like a real server
//! and records every call. Downloads can be told to break after a number of
//! bytes to exercise reconnects.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex};

use ftpin_core::client::{resolve_path, Endpoint, EntryKind, FtpClient, RemoteEntry, TransferType};
use ftpin_core::error::{FtpError, FtpResult};
use ftpin_core::progress::TransferListener;

#[derive(Debug, Clone)]
enum Node {
    File(Arc<Vec<u8>>),
    Dir,
    Link,
}

/// What a single `download` call should do.
#[derive(Debug, Clone)]
pub enum DownloadPlan {
    /// Serve everything from the requested offset.
    Complete,
    /// Fail with a transport error after this many bytes.
    BreakAfter(usize),
    /// Fail before sending anything.
    Refuse(FtpError),
}

#[derive(Debug, Default)]
pub struct FakeState {
    nodes: BTreeMap<String, Node>,
    home: String,
    /// Every call, e.g. `connect 127.0.0.1:21`, `cwd /data`, `list /data`.
    pub calls: Vec<String>,
    /// `(path, offset)` of every download.
    pub downloads: Vec<(String, u64)>,
    pub plans: VecDeque<DownloadPlan>,
    /// `(call, skip)`: let `skip` matching calls through, then fail one.
    pub fail_on: Vec<(&'static str, usize)>,
    pub disconnects: usize,
}

/// Shared handle: clone it, hand `client()` to the code under test, inspect later.
#[derive(Clone, Default)]
pub struct FakeFtp {
    state: Arc<Mutex<FakeState>>,
}

impl FakeFtp {
    pub fn new() -> Self {
        let fake = Self::default();
        {
            let mut s = fake.state();
            s.home = "/".to_string();
            s.nodes.insert("/".to_string(), Node::Dir);
        }
        fake
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_home(self, home: &str) -> Self {
        self.mkdirs(home);
        self.state().home = home.to_string();
        self
    }

    fn mkdirs(&self, dir: &str) {
        let mut s = self.state();
        let mut cur = String::new();
        for part in dir.split('/').filter(|p| !p.is_empty()) {
            cur.push('/');
            cur.push_str(part);
            s.nodes.entry(cur.clone()).or_insert(Node::Dir);
        }
    }

    pub fn file(self, path: &str, data: &[u8]) -> Self {
        if let Some((parent, _)) = path.rsplit_once('/') {
            self.mkdirs(parent);
        }
        self.state()
            .nodes
            .insert(path.to_string(), Node::File(Arc::new(data.to_vec())));
        self
    }

    pub fn dir(self, path: &str) -> Self {
        self.mkdirs(path);
        self
    }

    pub fn link(self, path: &str) -> Self {
        if let Some((parent, _)) = path.rsplit_once('/') {
            self.mkdirs(parent);
        }
        self.state().nodes.insert(path.to_string(), Node::Link);
        self
    }

    pub fn plan(self, plans: impl IntoIterator<Item = DownloadPlan>) -> Self {
        self.state().plans.extend(plans);
        self
    }

    pub fn fail_on(self, call: &'static str) -> Self {
        self.fail_on_nth(call, 0)
    }

    pub fn fail_on_nth(self, call: &'static str, skip: usize) -> Self {
        self.state().fail_on.push((call, skip));
        self
    }

    pub fn client(&self) -> Box<dyn FtpClient> {
        Box::new(FakeClient {
            state: Arc::clone(&self.state),
            cwd: None,
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn downloads(&self) -> Vec<(String, u64)> {
        self.state().downloads.clone()
    }
}

pub struct FakeClient {
    state: Arc<Mutex<FakeState>>,
    cwd: Option<String>,
}

impl FakeClient {
    fn record(&self, name: &'static str, detail: String) -> FtpResult<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(if detail.is_empty() {
            name.to_string()
        } else {
            format!("{} {}", name, detail)
        });
        if let Some(i) = s.fail_on.iter().position(|(c, _)| *c == name) {
            if s.fail_on[i].1 > 0 {
                s.fail_on[i].1 -= 1;
            } else {
                s.fail_on.remove(i);
                return Err(FtpError::Command {
                    code: 550,
                    message: format!("{} failed", name),
                });
            }
        }
        Ok(())
    }

    fn cwd(&self) -> FtpResult<&str> {
        self.cwd
            .as_deref()
            .ok_or_else(|| FtpError::Protocol("not connected".to_string()))
    }
}

impl FtpClient for FakeClient {
    fn connect(&mut self, endpoint: &Endpoint) -> FtpResult<()> {
        self.record("connect", format!("{}:{}", endpoint.host, endpoint.port))?;
        self.cwd = Some(self.state.lock().unwrap().home.clone());
        Ok(())
    }

    fn login(&mut self, user: &str, password: &str) -> FtpResult<()> {
        self.record("login", format!("{} {}", user, password))
    }

    fn set_passive(&mut self, passive: bool) -> FtpResult<()> {
        self.record("passive", passive.to_string())
    }

    fn set_type(&mut self, transfer_type: TransferType) -> FtpResult<()> {
        self.record("type", format!("{:?}", transfer_type))
    }

    fn is_compression_supported(&self) -> bool {
        false
    }

    fn set_compression(&mut self, enabled: bool) -> FtpResult<()> {
        self.record("compression", enabled.to_string())
    }

    fn current_directory(&mut self) -> FtpResult<String> {
        self.record("pwd", String::new())?;
        self.cwd().map(str::to_string)
    }

    fn change_directory(&mut self, path: &str) -> FtpResult<()> {
        let target = resolve_path(self.cwd()?, path);
        self.record("cwd", target.clone())?;
        match self.state.lock().unwrap().nodes.get(&target) {
            Some(Node::Dir) => {}
            _ => {
                return Err(FtpError::Command {
                    code: 550,
                    message: format!("{}: No such directory", target),
                })
            }
        }
        self.cwd = Some(target);
        Ok(())
    }

    fn list(&mut self) -> FtpResult<Vec<RemoteEntry>> {
        let dir = self.cwd()?.to_string();
        self.record("list", dir.clone())?;
        let s = self.state.lock().unwrap();
        let prefix = if dir.ends_with('/') {
            dir.clone()
        } else {
            format!("{}/", dir)
        };
        let mut entries = vec![RemoteEntry::directory("."), RemoteEntry::directory("..")];
        for (path, node) in s.nodes.iter() {
            let Some(name) = path.strip_prefix(&prefix) else {
                continue;
            };
            if name.is_empty() || name.contains('/') {
                continue;
            }
            let kind = match node {
                Node::File(_) => EntryKind::File,
                Node::Dir => EntryKind::Directory,
                Node::Link => EntryKind::Link,
            };
            entries.push(RemoteEntry::new(name, kind));
        }
        // servers list in no particular order
        entries.reverse();
        Ok(entries)
    }

    fn download(
        &mut self,
        path: &str,
        offset: u64,
        sink: &mut dyn Write,
        listener: &mut dyn TransferListener,
    ) -> FtpResult<u64> {
        let target = resolve_path(self.cwd()?, path);
        self.record("retr", format!("{} {}", target, offset))?;
        let (data, plan) = {
            let mut s = self.state.lock().unwrap();
            s.downloads.push((target.clone(), offset));
            let data = match s.nodes.get(&target) {
                Some(Node::File(data)) => Arc::clone(data),
                _ => {
                    return Err(FtpError::Command {
                        code: 550,
                        message: format!("{}: No such file", target),
                    })
                }
            };
            (data, s.plans.pop_front().unwrap_or(DownloadPlan::Complete))
        };
        let limit = match plan {
            DownloadPlan::Complete => None,
            DownloadPlan::BreakAfter(n) => Some(n),
            DownloadPlan::Refuse(e) => {
                listener.failed();
                return Err(e);
            }
        };

        listener.started();
        let start = (offset as usize).min(data.len());
        let end = limit.map_or(data.len(), |n| (start + n).min(data.len()));
        let mut sent = 0u64;
        for chunk in data[start..end].chunks(16) {
            let mut rest = chunk;
            while !rest.is_empty() {
                match sink.write(rest) {
                    Ok(0) => {
                        listener.aborted();
                        return Err(FtpError::ReaderClosed);
                    }
                    Ok(n) => {
                        rest = &rest[n..];
                        sent += n as u64;
                        listener.transferred(n);
                    }
                    Err(e) => {
                        listener.failed();
                        return Err(FtpError::from_io(e));
                    }
                }
            }
        }
        if limit.is_some() && end < data.len() {
            listener.failed();
            return Err(FtpError::transport("connection reset by peer"));
        }
        listener.completed();
        Ok(sent)
    }

    fn disconnect(&mut self) -> FtpResult<()> {
        self.state.lock().unwrap().disconnects += 1;
        self.record("disconnect", String::new())?;
        self.cwd = None;
        Ok(())
    }
}
