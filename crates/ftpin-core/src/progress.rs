//! Transfer progress callbacks.

/// Notified by `FtpClient::download` as a transfer proceeds.
pub trait TransferListener: Send {
    fn started(&mut self) {}
    fn transferred(&mut self, _len: usize) {}
    fn completed(&mut self) {}
    fn aborted(&mut self) {}
    fn failed(&mut self) {}
}

/// Log a notice every 100 MiB.
pub const TRANSFER_NOTICE_BYTES: u64 = 100 * 1024 * 1024;

/// Logs start, completion and a notice every `notice_bytes` transferred.
#[derive(Debug)]
pub struct LoggingTransferListener {
    path: String,
    notice_bytes: u64,
    total: u64,
    next_notice: u64,
}

impl LoggingTransferListener {
    pub fn new(path: impl Into<String>, notice_bytes: u64) -> Self {
        let notice_bytes = notice_bytes.max(1);
        Self {
            path: path.into(),
            notice_bytes,
            total: 0,
            next_notice: notice_bytes,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Total at which the next notice is logged.
    pub fn next_notice(&self) -> u64 {
        self.next_notice
    }
}

impl TransferListener for LoggingTransferListener {
    fn started(&mut self) {
        tracing::info!(path = %self.path, "Transfer started");
    }

    fn transferred(&mut self, len: usize) {
        self.total += len as u64;
        if self.total > self.next_notice {
            tracing::info!(path = %self.path, bytes = self.total, "Transferred {} bytes", self.total);
            self.next_notice = (self.total / self.notice_bytes + 1) * self.notice_bytes;
        }
    }

    fn completed(&mut self) {
        tracing::info!(path = %self.path, bytes = self.total, "Transfer completed {} bytes", self.total);
    }

    fn aborted(&mut self) {
        tracing::info!(path = %self.path, "Transfer aborted");
    }

    fn failed(&mut self) {
        tracing::info!(path = %self.path, "Transfer failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_threshold_advances_past_total() {
        let mut l = LoggingTransferListener::new("/a", 100);
        l.transferred(50);
        assert_eq!(l.next_notice(), 100);
        l.transferred(60);
        assert_eq!(l.total(), 110);
        assert_eq!(l.next_notice(), 200);
        l.transferred(250);
        assert_eq!(l.total(), 360);
        assert_eq!(l.next_notice(), 400);
    }
}
