//! One logical download presented as a single stream across reconnects.
//!
//! `ResumableStream` counts the bytes it delivered. When the underlying stream
//! fails, it drops it and asks a [`Reopener`] for a fresh stream positioned at
//! exactly that offset, retrying with backoff per [`RetryPolicy`]. The consumer
//! only notices the extra latency.

use std::io::{self, Read};

use crate::error::{FtpError, FtpResult};
use crate::retry::{run_with_retry, RetryPolicy, Sleeper, ThreadSleeper};

/// Boxed byte stream handed out by reopeners.
pub type ByteStream = Box<dyn Read + Send>;

/// Restarts a download at a byte offset after a failure.
pub trait Reopener: Send {
    fn reopen(&mut self, offset: u64, cause: &FtpError) -> FtpResult<ByteStream>;
}

impl<F> Reopener for F
where
    F: FnMut(u64, &FtpError) -> FtpResult<ByteStream> + Send,
{
    fn reopen(&mut self, offset: u64, cause: &FtpError) -> FtpResult<ByteStream> {
        self(offset, cause)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    Closed,
    Failed,
}

pub struct ResumableStream {
    current: Option<ByteStream>,
    reopener: Box<dyn Reopener>,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
    offset: u64,
    last_failure: Option<FtpError>,
    state: StreamState,
}

impl ResumableStream {
    pub fn new<R>(initial: ByteStream, reopener: R, policy: RetryPolicy) -> Self
    where
        R: Reopener + 'static,
    {
        Self::with_sleeper(initial, reopener, policy, ThreadSleeper)
    }

    pub fn with_sleeper<R, S>(initial: ByteStream, reopener: R, policy: RetryPolicy, sleeper: S) -> Self
    where
        R: Reopener + 'static,
        S: Sleeper + 'static,
    {
        Self {
            current: Some(initial),
            reopener: Box::new(reopener),
            policy,
            sleeper: Box::new(sleeper),
            offset: 0,
            last_failure: None,
            state: StreamState::Streaming,
        }
    }

    /// Bytes delivered to the consumer so far; the resume offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The most recent failure, recovered from or not.
    pub fn last_failure(&self) -> Option<&FtpError> {
        self.last_failure.as_ref()
    }

    /// Release the underlying stream. Idempotent.
    pub fn close(&mut self) {
        self.current = None;
        if self.state == StreamState::Streaming {
            self.state = StreamState::Closed;
        }
    }

    fn reopen(&mut self, cause: FtpError) -> FtpResult<()> {
        // the broken stream is dropped before a new download starts
        self.current = None;
        let offset = self.offset;
        tracing::warn!(
            offset,
            error = %cause,
            "FTP read failed. Retrying download with {} bytes offset",
            offset
        );

        let reopener = &mut self.reopener;
        let result = run_with_retry(&self.policy, self.sleeper.as_ref(), "FTP download", |_| {
            reopener.reopen(offset, &cause)
        });
        match result {
            Ok(stream) => {
                self.current = Some(stream);
                self.last_failure = Some(cause);
                Ok(())
            }
            Err(e) => {
                self.state = StreamState::Failed;
                self.last_failure = Some(e.clone());
                Err(e)
            }
        }
    }
}

impl Read for ResumableStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.state {
                StreamState::Closed => return Ok(0),
                StreamState::Failed => {
                    let err = self
                        .last_failure
                        .clone()
                        .unwrap_or_else(|| FtpError::transport("stream failed"));
                    return Err(err.into());
                }
                StreamState::Streaming => {}
            }

            let result = match self.current.as_mut() {
                Some(stream) => stream.read(buf),
                None => Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "no underlying stream",
                )),
            };
            match result {
                Ok(0) => {
                    self.current = None;
                    self.state = StreamState::Closed;
                    return Ok(0);
                }
                Ok(n) => {
                    self.offset += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let cause = FtpError::from_io(e);
                    if cause.is_reader_closed() {
                        // cancelled from outside; a new download would be cancelled too
                        self.current = None;
                        self.state = StreamState::Failed;
                        self.last_failure = Some(cause.clone());
                        return Err(cause.into());
                    }
                    self.reopen(cause)?
                }
            }
        }
    }
}
