use std::time::Duration;

/// High-level classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network-level failure (reset, refused, data channel dropped, timeout).
    Connection,
    /// Server answered with an error reply. After a reconnect even 5xx
    /// replies (530 on a dropped login, 550 on a half-synced file) can clear.
    Reply,
    /// Cancellation or local misconfiguration; never retried.
    Fatal,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Jitterless exponential backoff with a hard retry ceiling.
///
/// `retry_limit` counts retries after the first attempt, so a limit of 3
/// allows at most 4 calls in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries (excluding the first attempt).
    pub retry_limit: u32,
    /// Wait before the first retry.
    pub initial_wait: Duration,
    /// Upper bound on the wait between retries.
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            initial_wait: Duration::from_millis(500),
            max_wait: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries. Useful to force an immediate give-up.
    pub fn no_retry() -> Self {
        Self {
            retry_limit: 0,
            ..Self::default()
        }
    }

    /// Decide whether to perform retry number `retry` (1-based) after an error of `kind`.
    pub fn decide(&self, retry: u32, kind: ErrorKind) -> RetryDecision {
        if retry == 0 || retry > self.retry_limit {
            return RetryDecision::NoRetry;
        }

        match kind {
            ErrorKind::Fatal => RetryDecision::NoRetry,
            ErrorKind::Connection | ErrorKind::Reply => {
                // initial * 2^(retry-1), capped.
                let exp = 1u32 << (retry - 1).min(16);
                let raw = self.initial_wait.saturating_mul(exp);
                RetryDecision::RetryAfter(raw.min(self.max_wait))
            }
        }
    }
}
