//! Classify FTP errors into retry policy error kinds.

use crate::error::FtpError;
use crate::retry::policy::ErrorKind;

/// Classify an `FtpError` for retry decisions.
///
/// Reopening a download retries every failure except cancellation and TLS
/// setup errors: a dropped control connection shows up as a connect,
/// transport or reply error on the next attempt, whatever the reply code.
pub fn classify(e: &FtpError) -> ErrorKind {
    match e {
        FtpError::Tls(_) | FtpError::ReaderClosed => ErrorKind::Fatal,
        FtpError::RetryExhausted { .. } => ErrorKind::Fatal,
        FtpError::Command { .. } => ErrorKind::Reply,
        FtpError::Connect { .. }
        | FtpError::Transport { .. }
        | FtpError::Io(_)
        | FtpError::Protocol(_)
        | FtpError::DriverPanicked(_) => ErrorKind::Connection,
    }
}
