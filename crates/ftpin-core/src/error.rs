//! Error type shared by the FTP client, session, bridge and resumable stream.
//!
//! Every transport, protocol and reply failure is folded into `FtpError` at the
//! client boundary so callers never enumerate libcurl error kinds. The type is
//! `Clone` because a single transfer failure is delivered to several observers
//! (the reader side of the bridge and the driver's own result).

use std::io;
use std::sync::Arc;

pub type FtpResult<T> = Result<T, FtpError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum FtpError {
    /// TCP connect, TLS handshake or login failed. Not retried.
    #[error("connect to {host}:{port} failed: {message}")]
    Connect {
        host: String,
        port: u16,
        message: String,
    },

    /// Server answered a command with an unexpected reply code.
    #[error("FTP command failed: {code} {message}")]
    Command { code: u32, message: String },

    /// Network-level failure during a command or data transfer.
    #[error("FTP transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    /// Reply or listing that could not be understood.
    #[error("FTP protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// TLS settings could not be applied to the connection.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// The consumer closed the stream before the transfer finished.
    #[error("reader closed channel")]
    ReaderClosed,

    /// The transfer driver thread panicked.
    #[error("transfer driver panicked: {0}")]
    DriverPanicked(String),

    /// Reopening a broken download failed on every attempt.
    #[error("giving up after {attempts} attempt(s): {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<FtpError>,
    },
}

impl FtpError {
    pub fn transport(message: impl Into<String>) -> Self {
        FtpError::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FtpError::Transport {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// True for the cancellation signal raised when the reader side closes early.
    pub fn is_reader_closed(&self) -> bool {
        matches!(self, FtpError::ReaderClosed)
    }

    /// Recover an `FtpError` that travelled through `io::Read`/`io::Write`.
    /// Plain I/O errors are wrapped as `FtpError::Io`.
    pub fn from_io(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<FtpError>()) {
            return FtpError::Io(Arc::new(err));
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<FtpError>()) {
            Some(Ok(ftp)) => *ftp,
            _ => FtpError::Io(Arc::new(io::Error::from(kind))),
        }
    }
}

impl From<io::Error> for FtpError {
    fn from(err: io::Error) -> Self {
        FtpError::from_io(err)
    }
}

impl From<FtpError> for io::Error {
    fn from(err: FtpError) -> Self {
        match err {
            FtpError::Io(inner) => match Arc::try_unwrap(inner) {
                Ok(io_err) => io_err,
                Err(shared) => io::Error::new(shared.kind(), FtpError::Io(shared)),
            },
            FtpError::ReaderClosed => io::Error::new(io::ErrorKind::BrokenPipe, err),
            other => io::Error::other(other),
        }
    }
}
