//! Single-slot monitor shared by one writer and one reader.

use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::FtpError;

#[derive(Debug)]
enum Terminal {
    Open,
    Eof,
    Failed(FtpError),
}

#[derive(Debug)]
struct State {
    chunk: Vec<u8>,
    pos: usize,
    full: bool,
    /// Chunks published by the writer.
    published: u64,
    /// Chunks the reader consumed completely. Discarded chunks do not count.
    drained: u64,
    /// Closed from outside the reader: reads fail instead of ending quietly.
    aborted: bool,
    terminal: Terminal,
}

impl State {
    fn discard_chunk(&mut self) {
        self.full = false;
        self.pos = 0;
        self.chunk.clear();
    }
}

/// What a blocked writer should do once the bridge left the `Open` state.
enum WriterExit {
    Stop,
    Fail(FtpError),
}

/// At most one pending chunk. `readable` wakes the reader when a chunk or a
/// terminal state is published, `writable` wakes the writer when the slot
/// drains or the reader goes away.
#[derive(Debug)]
pub(super) struct Slot {
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
}

impl Slot {
    pub(super) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                chunk: Vec::new(),
                pos: 0,
                full: false,
                published: 0,
                drained: 0,
                aborted: false,
                terminal: Terminal::Open,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn writer_exit(state: &State) -> Option<WriterExit> {
        match &state.terminal {
            Terminal::Open => None,
            Terminal::Failed(FtpError::ReaderClosed) => Some(WriterExit::Stop),
            Terminal::Failed(e) => Some(WriterExit::Fail(e.clone())),
            Terminal::Eof => Some(WriterExit::Fail(FtpError::Protocol(
                "write after end of stream".to_string(),
            ))),
        }
    }

    /// Publish `data` and block until the reader drained it.
    /// Returns `Ok(0)` when the reader closed first.
    pub(super) fn write(&self, data: &[u8]) -> Result<usize, FtpError> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut st = self.lock();
        loop {
            match Self::writer_exit(&st) {
                Some(WriterExit::Stop) => return Ok(0),
                Some(WriterExit::Fail(e)) => return Err(e),
                None if !st.full => break,
                None => st = self.writable.wait(st).unwrap_or_else(|p| p.into_inner()),
            }
        }

        st.chunk.extend_from_slice(data);
        st.pos = 0;
        st.full = true;
        st.published += 1;
        let seq = st.published;
        self.readable.notify_all();

        loop {
            if st.drained >= seq {
                return Ok(data.len());
            }
            match Self::writer_exit(&st) {
                Some(WriterExit::Stop) => return Ok(0),
                Some(WriterExit::Fail(e)) => return Err(e),
                None => st = self.writable.wait(st).unwrap_or_else(|p| p.into_inner()),
            }
        }
    }

    /// Wait for the last chunk to drain, then mark end-of-stream.
    /// Returns the recorded failure if the bridge failed in the meantime.
    pub(super) fn close_writer(&self) -> Result<(), FtpError> {
        let mut st = self.lock();
        while st.full && matches!(st.terminal, Terminal::Open) {
            st = self.writable.wait(st).unwrap_or_else(|p| p.into_inner());
        }
        let out = match &st.terminal {
            Terminal::Open => {
                st.terminal = Terminal::Eof;
                Ok(())
            }
            Terminal::Eof => Ok(()),
            Terminal::Failed(e) => Err(e.clone()),
        };
        self.readable.notify_all();
        out
    }

    /// Record a driver failure. A reader that already closed keeps its state.
    pub(super) fn fail(&self, err: FtpError) {
        let mut st = self.lock();
        if !matches!(st.terminal, Terminal::Failed(FtpError::ReaderClosed)) {
            st.terminal = Terminal::Failed(err);
        }
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub(super) fn read(&self, buf: &mut [u8]) -> Result<usize, FtpError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut st = self.lock();
        loop {
            if st.full {
                let available = st.chunk.len() - st.pos;
                let n = available.min(buf.len());
                let start = st.pos;
                buf[..n].copy_from_slice(&st.chunk[start..start + n]);
                st.pos += n;
                if st.pos == st.chunk.len() {
                    st.discard_chunk();
                    st.drained += 1;
                    self.writable.notify_all();
                }
                return Ok(n);
            }
            match &st.terminal {
                Terminal::Open => st = self.readable.wait(st).unwrap_or_else(|p| p.into_inner()),
                Terminal::Failed(FtpError::ReaderClosed) if st.aborted => {
                    return Err(FtpError::ReaderClosed)
                }
                Terminal::Eof | Terminal::Failed(FtpError::ReaderClosed) => return Ok(0),
                Terminal::Failed(e) => return Err(e.clone()),
            }
        }
    }

    /// Block until a chunk or a terminal state is available, without consuming.
    pub(super) fn wait_ready(&self) -> Result<(), FtpError> {
        let mut st = self.lock();
        while !st.full && matches!(st.terminal, Terminal::Open) {
            st = self.readable.wait(st).unwrap_or_else(|p| p.into_inner());
        }
        if st.full {
            return Ok(());
        }
        match &st.terminal {
            Terminal::Failed(e) => Err(e.clone()),
            Terminal::Open | Terminal::Eof => Ok(()),
        }
    }

    /// Reader-side close: drop any pending chunk and release the writer for good.
    pub(super) fn close_reader(&self) {
        self.shut(false);
    }

    /// Close on behalf of the reader's owner while the reader may still be
    /// in use. Like `close_reader`, but later reads fail with `ReaderClosed`.
    pub(super) fn abort(&self) {
        self.shut(true);
    }

    fn shut(&self, aborted: bool) {
        let mut st = self.lock();
        if st.full {
            st.discard_chunk();
        }
        if matches!(st.terminal, Terminal::Open) {
            st.terminal = Terminal::Failed(FtpError::ReaderClosed);
            st.aborted = aborted;
        }
        self.writable.notify_all();
        self.readable.notify_all();
    }
}
