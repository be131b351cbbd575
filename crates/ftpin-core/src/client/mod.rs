//! The FTP capability consumed by sessions and the lister.
//!
//! `FtpClient` is deliberately small: everything above it (session setup,
//! recursive listing, resumable downloads) is written against this trait so
//! the wire protocol stays behind one seam.

pub mod curl;
mod list_parse;

pub use self::curl::CurlFtpClient;
pub use list_parse::{parse_list_line, parse_list_output};

use std::fmt;
use std::io::Write;
use std::time::Duration;

use crate::error::FtpResult;
use crate::progress::TransferListener;
use crate::tls::TlsPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Link,
    Other,
}

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl RemoteEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, EntryKind::File)
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, EntryKind::Directory)
    }

    /// `.` or `..`
    pub fn is_dot(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// How the control connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Plain,
    /// TLS from the first byte (`ftps://`).
    Implicit,
    /// Plain connect upgraded with `AUTH TLS`.
    Explicit,
}

impl Security {
    pub fn default_port(self) -> u16 {
        match self {
            Security::Plain | Security::Explicit => 21,
            Security::Implicit => 990,
        }
    }

    pub fn is_tls(self) -> bool {
        !matches!(self, Security::Plain)
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Security::Plain => "plain",
            Security::Implicit => "implicit TLS",
            Security::Explicit => "explicit TLS",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Binary,
    Ascii,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    /// Abort a transfer that stays under 1 byte/s for this long.
    pub low_speed: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            low_speed: Duration::from_secs(60),
        }
    }
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub security: Security,
    pub tls: TlsPolicy,
    pub timeouts: Timeouts,
}

/// A single FTP control connection.
///
/// Paths passed to `change_directory` and `download` are either absolute or
/// relative to the current directory. Implementations may defer the actual
/// connect until the first command that needs the server.
pub trait FtpClient: Send {
    fn connect(&mut self, endpoint: &Endpoint) -> FtpResult<()>;
    fn login(&mut self, user: &str, password: &str) -> FtpResult<()>;
    fn set_passive(&mut self, passive: bool) -> FtpResult<()>;
    fn set_type(&mut self, transfer_type: TransferType) -> FtpResult<()>;
    fn is_compression_supported(&self) -> bool;
    fn set_compression(&mut self, enabled: bool) -> FtpResult<()>;
    fn current_directory(&mut self) -> FtpResult<String>;
    fn change_directory(&mut self, path: &str) -> FtpResult<()>;
    /// Entries of the current directory.
    fn list(&mut self) -> FtpResult<Vec<RemoteEntry>>;
    /// Stream `path` from byte `offset` into `sink`. Returns the bytes written.
    fn download(
        &mut self,
        path: &str,
        offset: u64,
        sink: &mut dyn Write,
        listener: &mut dyn TransferListener,
    ) -> FtpResult<u64>;
    fn disconnect(&mut self) -> FtpResult<()>;
}

impl<C: FtpClient + ?Sized> FtpClient for Box<C> {
    fn connect(&mut self, endpoint: &Endpoint) -> FtpResult<()> {
        (**self).connect(endpoint)
    }

    fn login(&mut self, user: &str, password: &str) -> FtpResult<()> {
        (**self).login(user, password)
    }

    fn set_passive(&mut self, passive: bool) -> FtpResult<()> {
        (**self).set_passive(passive)
    }

    fn set_type(&mut self, transfer_type: TransferType) -> FtpResult<()> {
        (**self).set_type(transfer_type)
    }

    fn is_compression_supported(&self) -> bool {
        (**self).is_compression_supported()
    }

    fn set_compression(&mut self, enabled: bool) -> FtpResult<()> {
        (**self).set_compression(enabled)
    }

    fn current_directory(&mut self) -> FtpResult<String> {
        (**self).current_directory()
    }

    fn change_directory(&mut self, path: &str) -> FtpResult<()> {
        (**self).change_directory(path)
    }

    fn list(&mut self) -> FtpResult<Vec<RemoteEntry>> {
        (**self).list()
    }

    fn download(
        &mut self,
        path: &str,
        offset: u64,
        sink: &mut dyn Write,
        listener: &mut dyn TransferListener,
    ) -> FtpResult<u64> {
        (**self).download(path, offset, sink, listener)
    }

    fn disconnect(&mut self) -> FtpResult<()> {
        (**self).disconnect()
    }
}

/// Join `path` onto `base` the way a server resolves `CWD`: absolute paths
/// replace the base, `.` is dropped and `..` pops one component.
pub fn resolve_path(base: &str, path: &str) -> String {
    let mut parts: Vec<&str> = if path.starts_with('/') {
        Vec::new()
    } else {
        base.split('/').filter(|s| !s.is_empty()).collect()
    };
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    format!("/{}", parts.join("/"))
}
