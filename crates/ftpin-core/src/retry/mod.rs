//! Retry and backoff policy.
//!
//! Error classification and bounded exponential backoff shared by the
//! resumable stream (reopen after a broken transfer). The sleep mechanism is
//! injected so tests can run the loop without waiting.

mod classify;
mod policy;
mod run;

pub use classify::classify;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, Sleeper, ThreadSleeper};
