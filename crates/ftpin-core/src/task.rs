//! Per-task input: one session, one file, one resumable stream.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};

use crate::checksum::HashingReader;
use crate::client::FtpClient;
use crate::error::{FtpError, FtpResult};
use crate::progress::{LoggingTransferListener, TRANSFER_NOTICE_BYTES};
use crate::resumable::{ByteStream, Reopener, ResumableStream};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::session::{FtpSession, SessionOptions, SharedSession};
use crate::transfer::{self, TransferHandle, TransferPool, TransferReader};

/// Outcome of one task as reported back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
}

/// The stream for one file, with the path it came from.
pub struct StreamWithHint {
    pub path: String,
    pub stream: ResumableStream,
}

/// Handles of the transfers a task started and has not joined yet.
type Transfers = Arc<Mutex<Vec<TransferHandle>>>;

pub struct FtpFileInput {
    session: SharedSession,
    pool: Arc<TransferPool>,
    transfers: Transfers,
    path: String,
    policy: RetryPolicy,
    sleeper: Option<Box<dyn Sleeper>>,
    opened: bool,
    closed: bool,
}

impl FtpFileInput {
    /// Open a dedicated session for `path`. Nothing is downloaded yet.
    pub fn open(
        task_index: usize,
        client: Box<dyn FtpClient>,
        options: &SessionOptions,
        path: impl Into<String>,
        policy: RetryPolicy,
    ) -> FtpResult<Self> {
        let session = FtpSession::open(client, options)?;
        Ok(Self {
            session: session.into_shared(),
            pool: Arc::new(TransferPool::new(format!("ftpin-transfer-{}", task_index))),
            transfers: Arc::new(Mutex::new(Vec::new())),
            path: path.into(),
            policy,
            sleeper: None,
            opened: false,
            closed: false,
        })
    }

    /// Replace the sleeper used between reopen attempts.
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Some(Box::new(sleeper));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The task's only stream on the first call, `None` afterwards.
    pub fn open_next(&mut self) -> FtpResult<Option<StreamWithHint>> {
        if self.opened || self.closed {
            return Ok(None);
        }
        self.opened = true;

        let initial = start_download(&self.session, &self.pool, &self.transfers, &self.path, 0)?;
        let reopener = FtpReopener {
            session: Arc::clone(&self.session),
            pool: Arc::clone(&self.pool),
            transfers: Arc::clone(&self.transfers),
            path: self.path.clone(),
        };
        let sleeper: Box<dyn Sleeper> = self.sleeper.take().unwrap_or_else(|| Box::new(ThreadSleeper));
        let stream = ResumableStream::with_sleeper(Box::new(initial), reopener, self.policy, sleeper);
        Ok(Some(StreamWithHint {
            path: self.path.clone(),
            stream,
        }))
    }

    /// Stream the file into `sink` and report size and digest.
    pub fn fetch_to(&mut self, sink: &mut dyn Write) -> Result<TaskReport> {
        let StreamWithHint { path, stream } = self
            .open_next()
            .with_context(|| format!("failed to start download of {}", self.path))?
            .context("task stream already consumed")?;
        let mut reader = HashingReader::new(stream);
        io::copy(&mut reader, sink)
            .map_err(FtpError::from_io)
            .with_context(|| format!("failed to download {}", path))?;
        sink.flush().with_context(|| format!("failed to flush output for {}", path))?;
        let (mut stream, bytes, sha256) = reader.finish();
        stream.close();
        // end of stream means the last driver finished; surface anything it reported
        for mut handle in take_transfers(&self.transfers) {
            handle
                .join()
                .with_context(|| format!("transfer of {} failed", path))?;
        }
        Ok(TaskReport { path, bytes, sha256 })
    }

    /// Cancel running transfers, stop transfer workers and disconnect.
    /// Idempotent; also runs on drop. A stream still held by the caller
    /// fails with `ReaderClosed` afterwards.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let handles = take_transfers(&self.transfers);
        for handle in &handles {
            handle.abort();
        }
        self.pool.shutdown();
        for mut handle in handles {
            match handle.join() {
                Ok(()) | Err(FtpError::ReaderClosed) => {}
                Err(e) => tracing::debug!(path = %self.path, error = %e, "transfer ended with error"),
            }
        }
        lock_session(&self.session).disconnect();
    }
}

impl Drop for FtpFileInput {
    fn drop(&mut self) {
        self.close();
    }
}

struct FtpReopener {
    session: SharedSession,
    pool: Arc<TransferPool>,
    transfers: Transfers,
    path: String,
}

impl Reopener for FtpReopener {
    fn reopen(&mut self, offset: u64, _cause: &FtpError) -> FtpResult<ByteStream> {
        // the stream dropped the broken reader, so earlier drivers are exiting
        for mut handle in take_transfers(&self.transfers) {
            if let Err(e) = handle.join() {
                tracing::debug!(path = %self.path, error = %e, "previous transfer ended");
            }
        }
        let reader = start_download(&self.session, &self.pool, &self.transfers, &self.path, offset)?;
        // surface connect and reply errors here, inside the retry loop
        reader.wait_ready()?;
        Ok(Box::new(reader))
    }
}

fn lock_session(session: &SharedSession) -> MutexGuard<'_, FtpSession> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn take_transfers(transfers: &Transfers) -> Vec<TransferHandle> {
    let mut guard = transfers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    std::mem::take(&mut *guard)
}

/// Run `RETR path` from `offset` on a pool worker, returning the read side.
fn start_download(
    session: &SharedSession,
    pool: &TransferPool,
    transfers: &Transfers,
    path: &str,
    offset: u64,
) -> FtpResult<TransferReader> {
    let session = Arc::clone(session);
    let path = path.to_string();
    let (reader, handle) = transfer::submit(pool, move |writer| {
        // waits until a previous driver on this session has let go
        let mut session = lock_session(&session);
        let mut listener = LoggingTransferListener::new(path.clone(), TRANSFER_NOTICE_BYTES);
        match session.download(&path, offset, writer, &mut listener) {
            Ok(_) => Ok(()),
            Err(e) => {
                match &e {
                    FtpError::Command { code, message } => {
                        tracing::info!("FTP command failed: {} {}", code, message)
                    }
                    FtpError::Transport { .. } | FtpError::Io(_) => {
                        tracing::info!("FTP data transfer failed")
                    }
                    FtpError::Protocol(_) => tracing::info!("FTP protocol error"),
                    _ => {}
                }
                Err(e)
            }
        }
    })?;
    transfers
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(handle);
    Ok(reader)
}
