//! Push-to-pull transfer bridge.
//!
//! A download driver that pushes bytes into a sink (libcurl's write callback)
//! runs on a worker thread of a [`TransferPool`] and writes into a
//! [`TransferWriter`]. The caller reads the same bytes from the matching
//! [`TransferReader`]. The two sides hand over one chunk at a time through a
//! single-slot monitor, so the writer blocks until the reader drained the
//! previous chunk and at most one chunk is ever buffered.
//!
//! Failures returned (or panics raised) by the driver become the terminal
//! state of the bridge and surface from the reader's next blocking `read`.
//! Closing the reader is the cancellation primitive: a blocked writer wakes up
//! and its `write` returns `Ok(0)`.
//!
//! The initiator keeps the [`TransferHandle`]. `join` waits for the driver
//! thread and re-raises its failure; `abort` cancels from outside the reader.

mod pool;
mod slot;

pub use pool::TransferPool;

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;

use crate::error::{FtpError, FtpResult};
use slot::Slot;

/// Writer half, owned by the driver for the duration of the transfer.
#[derive(Debug)]
pub struct TransferWriter {
    slot: Arc<Slot>,
}

impl TransferWriter {
    /// Mark end-of-stream once the last chunk drained. Called by the bridge
    /// when the driver returns `Ok`.
    fn close(&mut self) -> FtpResult<()> {
        self.slot.close_writer()
    }
}

impl io::Write for TransferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.slot.write(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reader half, handed to the caller of [`submit`].
#[derive(Debug)]
pub struct TransferReader {
    slot: Arc<Slot>,
}

impl TransferReader {
    /// Block until the first chunk, end-of-stream or a failure is available.
    /// Nothing is consumed.
    pub fn wait_ready(&self) -> FtpResult<()> {
        self.slot.wait_ready()
    }

    /// Close the reader early. Any blocked writer is released for good.
    pub fn close(&self) {
        self.slot.close_reader();
    }
}

impl io::Read for TransferReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.slot.read(buf).map_err(io::Error::from)
    }
}

impl Drop for TransferReader {
    fn drop(&mut self) {
        self.slot.close_reader();
    }
}

/// Initiator side of a submitted transfer, kept apart from the reader so a
/// task can cancel or await a driver whose reader it handed away.
#[derive(Debug)]
pub struct TransferHandle {
    slot: Arc<Slot>,
    done: Option<mpsc::Receiver<FtpResult<()>>>,
    outcome: Option<FtpResult<()>>,
}

impl TransferHandle {
    /// Release the driver even if the reader is still alive; the reader's
    /// next `read` fails with `ReaderClosed`.
    pub fn abort(&self) {
        self.slot.abort();
    }

    /// Block until the driver thread terminated and return its result:
    /// the error it failed with, `ReaderClosed` when it was cancelled, or
    /// `DriverPanicked`.
    pub fn join(&mut self) -> FtpResult<()> {
        if let Some(rx) = self.done.take() {
            let outcome = rx.recv().unwrap_or_else(|_| {
                Err(FtpError::DriverPanicked(
                    "driver exited without reporting".to_string(),
                ))
            });
            self.outcome = Some(outcome);
        }
        self.outcome.clone().unwrap_or_else(|| {
            Err(FtpError::DriverPanicked(
                "driver exited without reporting".to_string(),
            ))
        })
    }
}

/// Start `driver` on a worker thread of `pool` and return the reading side
/// plus the handle that observes the driver's result.
///
/// The driver gets exclusive access to the writer. Returning `Ok` closes the
/// stream cleanly after the last chunk is drained; returning `Err` records the
/// error as the reader's terminal failure.
pub fn submit<F>(pool: &TransferPool, driver: F) -> FtpResult<(TransferReader, TransferHandle)>
where
    F: FnOnce(&mut TransferWriter) -> FtpResult<()> + Send + 'static,
{
    let slot = Arc::new(Slot::new());
    let mut writer = TransferWriter {
        slot: Arc::clone(&slot),
    };
    let (done_tx, done_rx) = mpsc::sync_channel(1);

    pool.spawn(move || {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| driver(&mut writer))) {
            Ok(Ok(())) => writer.close(),
            Ok(Err(e)) => {
                if !e.is_reader_closed() {
                    tracing::debug!(error = %e, "transfer driver failed");
                }
                writer.slot.fail(e.clone());
                Err(e)
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                let e = FtpError::DriverPanicked(msg);
                writer.slot.fail(e.clone());
                Err(e)
            }
        };
        let _ = done_tx.send(outcome);
    })
    .map_err(|e| FtpError::transport_with("failed to spawn transfer worker", e))?;

    let handle = TransferHandle {
        slot: Arc::clone(&slot),
        done: Some(done_rx),
        outcome: None,
    };
    Ok((TransferReader { slot }, handle))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
