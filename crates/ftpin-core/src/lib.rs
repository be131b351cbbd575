pub mod config;
pub mod logging;

pub mod checksum;
pub mod client;
pub mod error;
pub mod listing;
pub mod plugin;
pub mod progress;
pub mod resumable;
pub mod retry;
pub mod session;
pub mod task;
pub mod tls;
pub mod transfer;

pub use error::{FtpError, FtpResult};
