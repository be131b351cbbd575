//! Retry loop: run a closure until success or policy says stop.

use std::time::Duration;

use super::classify;
use super::policy::{RetryDecision, RetryPolicy};
use crate::error::FtpError;

/// Blocks the calling thread between retries.
pub trait Sleeper: Send {
    fn sleep(&self, wait: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for Box<S> {
    fn sleep(&self, wait: Duration) {
        (**self).sleep(wait);
    }
}

/// `Sleeper` backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, wait: Duration) {
        std::thread::sleep(wait);
    }
}

/// Runs a closure until it succeeds or the retry policy says to stop.
///
/// `f` receives the 0-based attempt number. Every retry is logged with the
/// attempt count, limit and wait; giving up is logged once and reported as
/// `FtpError::RetryExhausted` carrying the last error.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    what: &str,
    mut f: F,
) -> Result<T, FtpError>
where
    F: FnMut(u32) -> Result<T, FtpError>,
{
    let mut attempt = 0u32;
    loop {
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => {
                let retry = attempt + 1;
                match policy.decide(retry, classify::classify(&e)) {
                    RetryDecision::NoRetry => {
                        tracing::error!(
                            attempts = retry,
                            limit = policy.retry_limit,
                            error = %e,
                            "{} failed; giving up",
                            what
                        );
                        return Err(FtpError::RetryExhausted {
                            attempts: retry,
                            source: Box::new(e),
                        });
                    }
                    RetryDecision::RetryAfter(wait) => {
                        tracing::warn!(
                            retry,
                            limit = policy.retry_limit,
                            wait_ms = wait.as_millis() as u64,
                            error = %e,
                            "{} failed. Retrying {}/{} after {:?}",
                            what,
                            retry,
                            policy.retry_limit,
                            wait
                        );
                        sleeper.sleep(wait);
                        attempt = retry;
                    }
                }
            }
        }
    }
}
