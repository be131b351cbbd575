//! One FTP control connection per task.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::client::{Endpoint, FtpClient, Security, Timeouts, TransferType};
use crate::error::FtpResult;
use crate::listing::{self, PathMatcher};
use crate::progress::TransferListener;
use crate::tls::TlsPolicy;

/// Everything needed to open a session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub host: String,
    /// `None` picks the default for `security`.
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub passive_mode: bool,
    pub ascii_mode: bool,
    pub security: Security,
    pub tls: TlsPolicy,
    pub timeouts: Timeouts,
}

impl SessionOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: None,
            password: None,
            passive_mode: true,
            ascii_mode: false,
            security: Security::Plain,
            tls: TlsPolicy::default(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.security.default_port())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.effective_port(),
            security: self.security,
            tls: self.tls.clone(),
            timeouts: self.timeouts,
        }
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("passive_mode", &self.passive_mode)
            .field("ascii_mode", &self.ascii_mode)
            .field("security", &self.security)
            .field("tls", &self.tls)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

/// A connected, logged-in client. Disconnected exactly once, explicitly or on drop.
pub struct FtpSession {
    client: Box<dyn FtpClient>,
    host: String,
    port: u16,
    connected: bool,
}

/// Session shared between a task and its transfer driver.
pub type SharedSession = Arc<Mutex<FtpSession>>;

impl FtpSession {
    /// Connect, log in and set the transfer modes. On failure the client is
    /// disconnected before the error is returned.
    pub fn open(mut client: Box<dyn FtpClient>, options: &SessionOptions) -> FtpResult<Self> {
        let endpoint = options.endpoint();
        tracing::info!(
            host = %endpoint.host,
            port = endpoint.port,
            security = %endpoint.security,
            "Connecting to {}:{}",
            endpoint.host,
            endpoint.port
        );
        if endpoint.security.is_tls() && !endpoint.tls.verifies_peer() {
            tracing::warn!("TLS peer verification is disabled");
        }

        if let Err(e) = setup(client.as_mut(), &endpoint, options) {
            if let Err(close_err) = client.disconnect() {
                tracing::debug!(error = %close_err, "disconnect after failed setup");
            }
            return Err(e);
        }

        Ok(Self {
            client,
            host: endpoint.host,
            port: endpoint.port,
            connected: true,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn list_files(
        &mut self,
        prefix: &str,
        last_path: Option<&str>,
        matcher: &PathMatcher,
    ) -> FtpResult<Vec<String>> {
        listing::list_files(self.client.as_mut(), prefix, last_path, matcher)
    }

    pub fn download(
        &mut self,
        path: &str,
        offset: u64,
        sink: &mut dyn Write,
        listener: &mut dyn TransferListener,
    ) -> FtpResult<u64> {
        self.client.download(path, offset, sink, listener)
    }

    /// Idempotent; errors are logged and dropped.
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        match self.client.disconnect() {
            Ok(()) => tracing::debug!(host = %self.host, "Disconnected"),
            Err(e) => tracing::debug!(host = %self.host, error = %e, "disconnect failed"),
        }
    }
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn setup(client: &mut dyn FtpClient, endpoint: &Endpoint, options: &SessionOptions) -> FtpResult<()> {
    client.connect(endpoint)?;
    if let Some(user) = &options.user {
        tracing::info!(user = %user, "Logging in with user {}", user);
        client.login(user, options.password.as_deref().unwrap_or(""))?;
    }
    if options.passive_mode {
        tracing::info!("Using passive mode");
    } else {
        tracing::info!("Using active mode");
    }
    client.set_passive(options.passive_mode)?;
    let transfer_type = if options.ascii_mode {
        tracing::info!("Using ASCII mode");
        TransferType::Ascii
    } else {
        tracing::info!("Using binary mode");
        TransferType::Binary
    };
    client.set_type(transfer_type)?;
    if client.is_compression_supported() {
        tracing::info!("Using MODE Z compression");
        client.set_compression(true)?;
    }
    let cwd = client.current_directory()?;
    tracing::info!(directory = %cwd, "Connected, current directory");
    Ok(())
}
