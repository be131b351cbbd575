//! Per-task pool of short-lived transfer worker threads.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;

/// Spawns one named thread per download and joins them when the task ends.
///
/// Growth is unbounded: a task only has one download in flight at a time, plus
/// a previous attempt that may still be winding down after a reopen.
pub struct TransferPool {
    name: String,
    next_id: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TransferPool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn spawn<F>(&self, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = std::thread::Builder::new()
            .name(format!("{}-{}", self.name, id))
            .spawn(f)?;
        let mut workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        workers.retain(|h| !h.is_finished());
        workers.push(handle);
        Ok(())
    }

    /// Number of workers that have not exited yet.
    pub fn active_workers(&self) -> usize {
        let workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        workers.iter().filter(|h| !h.is_finished()).count()
    }

    /// Join every worker. Readers must be closed first, otherwise a driver
    /// blocked on an undrained chunk keeps its thread alive.
    pub fn shutdown(&self) {
        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.workers.lock().unwrap_or_else(|p| p.into_inner());
            guard.drain(..).collect()
        };
        for handle in workers {
            if handle.join().is_err() {
                tracing::warn!(pool = %self.name, "transfer worker panicked");
            }
        }
    }
}

impl Drop for TransferPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
