//! Remote file selection: recursive walk filtered by prefix, pattern and watermark.

use regex::Regex;

use crate::client::{EntryKind, FtpClient};
use crate::error::FtpResult;

/// Regex searched anywhere in the full remote path.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    regex: Regex,
}

impl PathMatcher {
    pub const DEFAULT_PATTERN: &'static str = ".*";

    /// An empty or blank pattern matches everything.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let pattern = if pattern.trim().is_empty() {
            Self::DEFAULT_PATTERN
        } else {
            pattern
        };
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Restores the working directory saved on construction.
///
/// Call [`restore`](Self::restore) on the success path to see restore errors;
/// dropping the guard restores best-effort and only logs.
pub struct DirectoryGuard<'a, C: FtpClient + ?Sized> {
    client: &'a mut C,
    saved: String,
    restored: bool,
}

impl<'a, C: FtpClient + ?Sized> DirectoryGuard<'a, C> {
    /// Remember the current directory, then change into `dir`.
    pub fn enter(client: &'a mut C, dir: &str) -> FtpResult<Self> {
        let saved = client.current_directory()?;
        client.change_directory(dir)?;
        Ok(Self {
            client,
            saved,
            restored: false,
        })
    }

    pub fn client(&mut self) -> &mut C {
        self.client
    }

    pub fn restore(mut self) -> FtpResult<()> {
        self.restored = true;
        self.client.change_directory(&self.saved)
    }
}

impl<C: FtpClient + ?Sized> Drop for DirectoryGuard<'_, C> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = self.client.change_directory(&self.saved) {
            tracing::debug!(directory = %self.saved, error = %e, "failed to restore working directory");
        }
    }
}

/// Split `prefix` at its last `/`. The directory part keeps the slash.
pub fn split_prefix(prefix: &str) -> (&str, &str) {
    match prefix.rfind('/') {
        Some(i) => prefix.split_at(i + 1),
        None => ("", prefix),
    }
}

/// Files selected by `prefix`, `last_path` and `matcher`, sorted and
/// deduplicated. Any failure aborts the whole listing.
pub fn list_files<C: FtpClient + ?Sized>(
    client: &mut C,
    prefix: &str,
    last_path: Option<&str>,
    matcher: &PathMatcher,
) -> FtpResult<Vec<String>> {
    let (directory, file_name_prefix) = split_prefix(prefix);
    let mut out = Vec::new();

    if directory.is_empty() {
        let base = client.current_directory()?;
        walk(client, &base, Some(file_name_prefix), last_path, matcher, &mut out)?;
    } else {
        let mut guard = DirectoryGuard::enter(client, directory)?;
        walk(guard.client(), directory, Some(file_name_prefix), last_path, matcher, &mut out)?;
        guard.restore()?;
    }

    out.sort();
    out.dedup();
    tracing::info!(prefix, files = out.len(), "Listed remote files");
    Ok(out)
}

fn walk<C: FtpClient + ?Sized>(
    client: &mut C,
    base: &str,
    name_prefix: Option<&str>,
    last_path: Option<&str>,
    matcher: &PathMatcher,
    out: &mut Vec<String>,
) -> FtpResult<()> {
    for entry in client.list()? {
        if entry.is_dot() {
            continue;
        }
        if let Some(p) = name_prefix {
            if !entry.name.starts_with(p) {
                continue;
            }
        }
        let path = join(base, &entry.name);
        match entry.kind {
            EntryKind::File => {
                if last_path.is_some_and(|last| path.as_str() <= last) {
                    continue;
                }
                if matcher.matches(&path) {
                    tracing::debug!(path = %path, "add file");
                    out.push(path);
                }
            }
            EntryKind::Directory => {
                let mut guard = DirectoryGuard::enter(client, &entry.name)?;
                walk(guard.client(), &path, None, last_path, matcher, out)?;
                guard.restore()?;
            }
            EntryKind::Link | EntryKind::Other => {
                tracing::debug!(path = %path, kind = ?entry.kind, "skipping non-regular entry");
            }
        }
    }
    Ok(())
}

fn join(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Watermark after a run: the greatest selected path, or `previous` if
/// nothing was selected.
pub fn next_last_path(selected: &[String], previous: Option<&str>) -> Option<String> {
    selected
        .iter()
        .max()
        .cloned()
        .or_else(|| previous.map(str::to_string))
}
